// src/grading.rs
//! Applies a run's graders to its successful results.
//!
//! Every (result, grader) pair is isolated: an unknown grader, a missing test
//! case, a grader error, panic or timeout, or a failed score write is counted
//! and logged, and grading carries on with the next pair.

use futures::future;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{EvalError, Result};
use crate::graders::GraderRegistry;
use crate::models::{EvaluationResult, ResponseStatus, Score};
use crate::repository::Repository;

pub const DEFAULT_GRADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters returned by [`GradingStage::grade_run`]. Logged, not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradingMetrics {
    pub total_results: usize,
    /// Attempted (result, grader) pairs.
    pub total_scores: usize,
    pub successful_scores: usize,
    pub failed_scores: usize,
    pub errors: Vec<String>,
}

impl GradingMetrics {
    fn record(&mut self, outcome: Result<()>) {
        self.total_scores += 1;
        match outcome {
            Ok(()) => self.successful_scores += 1,
            Err(e) => {
                log::warn!("{}", e);
                self.failed_scores += 1;
                self.errors.push(e.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraderTally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl GraderTally {
    fn add(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GradingSummary {
    pub total_scores: usize,
    pub passed: usize,
    pub failed: usize,
    pub by_grader: BTreeMap<String, GraderTally>,
}

impl GradingSummary {
    pub fn from_scores(scores: &[Score]) -> Self {
        let mut summary = GradingSummary::default();
        for score in scores {
            summary.total_scores += 1;
            if score.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary
                .by_grader
                .entry(score.grader_id.clone())
                .or_default()
                .add(score.passed);
        }
        summary
    }
}

#[derive(Clone)]
pub struct GradingStage {
    repo: Arc<dyn Repository>,
    graders: Arc<GraderRegistry>,
    grader_timeout: Duration,
}

impl GradingStage {
    pub fn new(repo: Arc<dyn Repository>, graders: Arc<GraderRegistry>, grader_timeout: Duration) -> Self {
        Self {
            repo,
            graders,
            grader_timeout,
        }
    }

    /// Grades every successful result of `run_id` with every grader of the run.
    pub async fn grade_run(&self, run_id: &str) -> Result<GradingMetrics> {
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or_else(|| EvalError::not_found("EvaluationRun", run_id))?;
        let results = self.repo.list_results(run_id).await?;

        let mut metrics = GradingMetrics {
            total_results: results.len(),
            ..Default::default()
        };

        for result in &results {
            if result.response_status != ResponseStatus::Success {
                log::debug!("Skipping grading for non-success result {}", result.id);
                continue;
            }

            let expected = self.expected_output(result).await;
            let attempts = run
                .grader_ids
                .iter()
                .map(|grader_id| self.grade_pair(grader_id, result, expected.as_ref()));
            for outcome in future::join_all(attempts).await {
                metrics.record(outcome);
            }
        }

        log::info!(
            "Grading completed for run {}: {} scored, {} failed",
            run_id,
            metrics.successful_scores,
            metrics.failed_scores
        );
        Ok(metrics)
    }

    /// Aggregates persisted scores for `run_id`.
    pub async fn summarize(&self, run_id: &str) -> Result<GradingSummary> {
        let scores = self.repo.list_all_scores(run_id).await?;
        Ok(GradingSummary::from_scores(&scores))
    }

    async fn expected_output(&self, result: &EvaluationResult) -> std::result::Result<String, String> {
        match self.repo.get_test_case(&result.test_case_id).await {
            Ok(Some(test_case)) => Ok(test_case.expected_output),
            Ok(None) => Err(format!("test case {} not found", result.test_case_id)),
            Err(e) => Err(format!("could not load test case {}: {}", result.test_case_id, e)),
        }
    }

    async fn grade_pair(
        &self,
        grader_id: &str,
        result: &EvaluationResult,
        expected: std::result::Result<&String, &String>,
    ) -> Result<()> {
        let failure = |message: String| EvalError::GraderFailure {
            grader_id: grader_id.to_string(),
            result_id: result.id.clone(),
            message,
        };

        let grader = self
            .graders
            .resolve(grader_id)
            .ok_or_else(|| failure("grader not found".to_string()))?;
        let expected = expected.map_err(|message| failure(message.clone()))?.clone();
        let response = result.agent_response.clone().unwrap_or_default();

        let task = tokio::task::spawn_blocking(move || grader.grade(&response, &expected));
        let verdict = match tokio::time::timeout(self.grader_timeout, task).await {
            Err(_) => {
                return Err(failure(format!(
                    "timed out after {}ms",
                    self.grader_timeout.as_millis()
                )))
            }
            Ok(Err(join_error)) => return Err(failure(format!("grader panicked: {}", join_error))),
            Ok(Ok(Err(e))) => return Err(failure(e.to_string())),
            Ok(Ok(Ok(verdict))) => verdict,
        };

        if !(0.0..=1.0).contains(&verdict.score) {
            return Err(failure(format!("score {} outside [0.0, 1.0]", verdict.score)));
        }

        let score = Score::new(
            &result.id,
            grader_id,
            verdict.passed,
            Some(verdict.score),
            Some(verdict.details),
        );
        self.repo
            .upsert_score(&score)
            .await
            .map_err(|e| failure(format!("could not store score: {}", e)))
    }
}
