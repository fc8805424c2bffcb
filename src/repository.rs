// src/repository.rs
//! Storage contract for test cases, runs, results and scores.
//!
//! Every list operation returns items in insertion order. Pagination is
//! offset/limit; an offset past the end yields an empty page.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::{EvalError, Result};
use crate::models::{
    EvaluationResult, EvaluationRun, RunStatus, RunUpdate, Score, TestCase, TestCaseUpdate,
};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_test_case(&self, test_case: &TestCase) -> Result<()>;
    async fn get_test_case(&self, id: &str) -> Result<Option<TestCase>>;
    async fn list_test_cases(&self, skip: usize, limit: usize) -> Result<Vec<TestCase>>;
    /// Returns the updated test case, or `None` if it does not exist.
    async fn update_test_case(&self, id: &str, update: TestCaseUpdate) -> Result<Option<TestCase>>;
    /// Returns whether a test case was removed.
    async fn delete_test_case(&self, id: &str) -> Result<bool>;

    async fn create_run(&self, run: &EvaluationRun) -> Result<()>;
    async fn get_run(&self, id: &str) -> Result<Option<EvaluationRun>>;
    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<EvaluationRun>>;
    /// Applies a partial update. Fails with `NotFound` if the run is absent.
    async fn update_run(&self, id: &str, update: RunUpdate) -> Result<EvaluationRun>;
    /// Atomically moves a `pending` run to `running`.
    ///
    /// Returns `false` if the run exists but is no longer pending.
    async fn begin_run(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool>;

    async fn create_result(&self, result: &EvaluationResult) -> Result<()>;
    async fn list_results(&self, run_id: &str) -> Result<Vec<EvaluationResult>>;

    /// Stores a score, replacing any existing score for the same
    /// (result, grader) pair.
    async fn upsert_score(&self, score: &Score) -> Result<()>;
    async fn list_scores(&self, result_id: &str) -> Result<Vec<Score>>;
    /// All scores of all results belonging to `run_id`.
    async fn list_all_scores(&self, run_id: &str) -> Result<Vec<Score>>;
}

fn page<T: Clone>(items: &[T], skip: usize, limit: usize) -> Vec<T> {
    items.iter().skip(skip).take(limit).cloned().collect()
}

#[derive(Default)]
struct Tables {
    test_cases: Vec<TestCase>,
    runs: Vec<EvaluationRun>,
    results: Vec<EvaluationResult>,
    scores: Vec<Score>,
}

/// Process-local repository backed by insertion-ordered vectors.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_test_case(&self, test_case: &TestCase) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.test_cases.iter().any(|tc| tc.id == test_case.id) {
            return Err(EvalError::Validation(format!("test case '{}' already exists", test_case.id)));
        }
        tables.test_cases.push(test_case.clone());
        Ok(())
    }

    async fn get_test_case(&self, id: &str) -> Result<Option<TestCase>> {
        let tables = self.tables.read().await;
        Ok(tables.test_cases.iter().find(|tc| tc.id == id).cloned())
    }

    async fn list_test_cases(&self, skip: usize, limit: usize) -> Result<Vec<TestCase>> {
        let tables = self.tables.read().await;
        Ok(page(&tables.test_cases, skip, limit))
    }

    async fn update_test_case(&self, id: &str, update: TestCaseUpdate) -> Result<Option<TestCase>> {
        let mut tables = self.tables.write().await;
        Ok(tables.test_cases.iter_mut().find(|tc| tc.id == id).map(|tc| {
            update.apply(tc);
            tc.clone()
        }))
    }

    async fn delete_test_case(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.test_cases.len();
        tables.test_cases.retain(|tc| tc.id != id);
        Ok(tables.test_cases.len() != before)
    }

    async fn create_run(&self, run: &EvaluationRun) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.runs.iter().any(|r| r.id == run.id) {
            return Err(EvalError::Validation(format!("evaluation run '{}' already exists", run.id)));
        }
        tables.runs.push(run.clone());
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<EvaluationRun>> {
        let tables = self.tables.read().await;
        Ok(tables.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<EvaluationRun>> {
        let tables = self.tables.read().await;
        Ok(page(&tables.runs, skip, limit))
    }

    async fn update_run(&self, id: &str, update: RunUpdate) -> Result<EvaluationRun> {
        let mut tables = self.tables.write().await;
        let run = tables
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EvalError::not_found("EvaluationRun", id))?;
        update.apply(run);
        Ok(run.clone())
    }

    async fn begin_run(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let run = tables
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| EvalError::not_found("EvaluationRun", id))?;
        if run.status != RunStatus::Pending {
            return Ok(false);
        }
        run.status = RunStatus::Running;
        run.started_at = Some(started_at);
        Ok(true)
    }

    async fn create_result(&self, result: &EvaluationResult) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.results.push(result.clone());
        Ok(())
    }

    async fn list_results(&self, run_id: &str) -> Result<Vec<EvaluationResult>> {
        let tables = self.tables.read().await;
        Ok(tables.results.iter().filter(|r| r.run_id == run_id).cloned().collect())
    }

    async fn upsert_score(&self, score: &Score) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables
            .scores
            .iter_mut()
            .find(|s| s.result_id == score.result_id && s.grader_id == score.grader_id)
        {
            Some(existing) => *existing = score.clone(),
            None => tables.scores.push(score.clone()),
        }
        Ok(())
    }

    async fn list_scores(&self, result_id: &str) -> Result<Vec<Score>> {
        let tables = self.tables.read().await;
        Ok(tables.scores.iter().filter(|s| s.result_id == result_id).cloned().collect())
    }

    async fn list_all_scores(&self, run_id: &str) -> Result<Vec<Score>> {
        let tables = self.tables.read().await;
        let result_ids: Vec<&str> = tables
            .results
            .iter()
            .filter(|r| r.run_id == run_id)
            .map(|r| r.id.as_str())
            .collect();
        Ok(tables
            .scores
            .iter()
            .filter(|s| result_ids.contains(&s.result_id.as_str()))
            .cloned()
            .collect())
    }
}
