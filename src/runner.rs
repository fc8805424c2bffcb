// src/runner.rs
use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;

use crate::agent::{AgentClient, AgentOutcome};
use crate::errors::{EvalError, Result};
use crate::graders::GraderRegistry;
use crate::grading::GradingStage;
use crate::models::{EvaluationResult, EvaluationRun, NewRun, ResponseStatus, RunUpdate};
use crate::repository::Repository;

fn result_from_outcome(run_id: &str, test_case_id: &str, outcome: AgentOutcome) -> EvaluationResult {
    match outcome {
        AgentOutcome::Success { response, latency_ms } => EvaluationResult::new(
            run_id,
            test_case_id,
            Some(response),
            Some(latency_ms),
            ResponseStatus::Success,
            None,
        ),
        AgentOutcome::Timeout { latency_ms, message } => EvaluationResult::new(
            run_id,
            test_case_id,
            None,
            Some(latency_ms),
            ResponseStatus::Timeout,
            Some(message),
        ),
        AgentOutcome::Error { latency_ms, message } => EvaluationResult::new(
            run_id,
            test_case_id,
            None,
            Some(latency_ms),
            ResponseStatus::Error,
            Some(message),
        ),
    }
}

/// Owns the run state machine: pending -> running -> completed | failed.
#[derive(Clone)]
pub struct EvaluationRunner {
    repo: Arc<dyn Repository>,
    agent: AgentClient,
    grading: GradingStage,
    graders: Arc<GraderRegistry>,
}

impl EvaluationRunner {
    pub fn new(
        repo: Arc<dyn Repository>,
        agent: AgentClient,
        grading: GradingStage,
        graders: Arc<GraderRegistry>,
    ) -> Self {
        Self {
            repo,
            agent,
            grading,
            graders,
        }
    }

    pub fn grading(&self) -> &GradingStage {
        &self.grading
    }

    /// Validates a submission and stores it as a `pending` run.
    pub async fn submit(&self, new_run: NewRun) -> Result<EvaluationRun> {
        if new_run.test_case_ids.is_empty() {
            return Err(EvalError::Validation("test_case_ids must not be empty".to_string()));
        }
        if new_run.grader_ids.is_empty() {
            return Err(EvalError::Validation("grader_ids must not be empty".to_string()));
        }
        validate_endpoint(&new_run.agent_endpoint_url)?;
        if let Some(unknown) = new_run.grader_ids.iter().find(|id| !self.graders.is_known(id)) {
            log::warn!("Rejecting run with unknown grader id '{}'", unknown);
            return Err(EvalError::UnknownGrader(unknown.clone()));
        }

        let run = EvaluationRun::pending(new_run);
        self.repo.create_run(&run).await?;
        log::info!(
            "Created evaluation run {} ({} test cases, graders: {})",
            run.id,
            run.test_case_ids.len(),
            run.grader_ids.join(", ")
        );
        Ok(run)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<EvaluationRun> {
        self.repo
            .get_run(run_id)
            .await?
            .ok_or_else(|| EvalError::not_found("EvaluationRun", run_id))
    }

    pub async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<EvaluationRun>> {
        self.repo.list_runs(skip, limit).await
    }

    pub async fn list_results(&self, run_id: &str) -> Result<Vec<EvaluationResult>> {
        self.get_run(run_id).await?;
        self.repo.list_results(run_id).await
    }

    /// Executes a pending run to a terminal state, then grades it.
    ///
    /// A second call for the same run is rejected with `RunAlreadyStarted`.
    pub async fn start(&self, run_id: &str) -> Result<EvaluationRun> {
        let run = self.get_run(run_id).await?;
        if !self.repo.begin_run(run_id, Utc::now()).await? {
            let current = self.get_run(run_id).await?;
            return Err(EvalError::RunAlreadyStarted {
                id: run_id.to_string(),
                status: current.status.to_string(),
            });
        }
        log::info!("Evaluation run {} is running against {}", run_id, run.agent_endpoint_url);
        let started = Instant::now();

        let mut result_count = 0u32;
        let outcome = match self.execute_cases(&run, &mut result_count).await {
            Ok(()) => self
                .repo
                .update_run(run_id, RunUpdate::completed(result_count))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            log::error!("Evaluation run {} failed: {}", run_id, e);
            if let Err(update_err) = self
                .repo
                .update_run(run_id, RunUpdate::failed(result_count, &e.to_string()))
                .await
            {
                log::error!("Could not mark run {} as failed: {}", run_id, update_err);
            }
            return Err(EvalError::Orchestration {
                run_id: run_id.to_string(),
                source: Box::new(e),
            });
        }

        log::info!(
            "Evaluation run {} completed with {} results in {}ms",
            run_id,
            result_count,
            started.elapsed().as_millis()
        );

        match self.grading.grade_run(run_id).await {
            Ok(metrics) => log::info!("Grading metrics for run {}: {:?}", run_id, metrics),
            Err(e) => log::error!("Grading failed for run {}: {}", run_id, e),
        }

        self.get_run(run_id).await
    }

    async fn execute_cases(&self, run: &EvaluationRun, result_count: &mut u32) -> Result<()> {
        for test_case_id in &run.test_case_ids {
            let Some(test_case) = self.repo.get_test_case(test_case_id).await? else {
                log::warn!(
                    "Run {}: test case {} not found, skipping",
                    run.id,
                    test_case_id
                );
                continue;
            };

            let outcome = self.agent.invoke(&run.agent_endpoint_url, &test_case.input).await;
            let result = result_from_outcome(&run.id, test_case_id, outcome);
            self.repo.create_result(&result).await?;
            *result_count += 1;
        }
        Ok(())
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| EvalError::Validation(format!("invalid agent_endpoint_url '{}': {}", endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(EvalError::Validation(format!(
            "agent_endpoint_url must use http or https, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::DEFAULT_GRADER_TIMEOUT;
    use crate::models::{NewTestCase, RunStatus, TestCase, TestCaseUpdate};
    use crate::repository::MemoryRepository;
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner_with(repo: Arc<dyn Repository>, timeout: Duration) -> EvaluationRunner {
        let graders = Arc::new(GraderRegistry::builtin().unwrap());
        let grading = GradingStage::new(repo.clone(), graders.clone(), DEFAULT_GRADER_TIMEOUT);
        EvaluationRunner::new(repo, AgentClient::new(reqwest::Client::new(), timeout), grading, graders)
    }

    async fn seed(repo: &dyn Repository, input: &str, expected: &str) -> TestCase {
        let tc = NewTestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
            description: None,
            tags: None,
        }
        .into_test_case()
        .unwrap();
        repo.create_test_case(&tc).await.unwrap();
        tc
    }

    async fn echo_agent() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hello"})))
            .mount(&server)
            .await;
        server
    }

    fn new_run(test_case_ids: Vec<String>, endpoint: String) -> NewRun {
        NewRun {
            test_case_ids,
            agent_endpoint_url: endpoint,
            grader_ids: vec!["string-match".to_string()],
        }
    }

    #[tokio::test]
    async fn test_run_completes_and_grades() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let runner = runner_with(repo.clone(), Duration::from_secs(5));
        let server = echo_agent().await;
        let tc1 = seed(repo.as_ref(), "Hello", "hello").await;
        let tc2 = seed(repo.as_ref(), "World", "world").await;

        let run = runner
            .submit(new_run(vec![tc1.id.clone(), tc2.id.clone()], server.uri()))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        let done = runner.start(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.result_count, 2);
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());

        let results = runner.list_results(&run.id).await.unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.test_case_id.as_str()).collect();
        assert_eq!(order, vec![tc1.id.as_str(), tc2.id.as_str()]);
        assert!(results.iter().all(|r| r.response_status == ResponseStatus::Success));

        let summary = runner.grading().summarize(&run.id).await.unwrap();
        assert_eq!(summary.total_scores, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_missing_test_case_is_skipped() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let runner = runner_with(repo.clone(), Duration::from_secs(5));
        let server = echo_agent().await;
        let tc = seed(repo.as_ref(), "Hello", "hello").await;

        let run = runner
            .submit(new_run(vec![tc.id.clone(), "does-not-exist".to_string()], server.uri()))
            .await
            .unwrap();
        let done = runner.start(&run.id).await.unwrap();

        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.result_count, 1);
        assert_eq!(runner.list_results(&run.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_agent_failures_are_recorded_not_fatal() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let runner = runner_with(repo.clone(), Duration::from_millis(200));
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let tc = seed(repo.as_ref(), "Hello", "hello").await;

        let run = runner.submit(new_run(vec![tc.id.clone()], server.uri())).await.unwrap();
        let done = runner.start(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);

        let results = runner.list_results(&run.id).await.unwrap();
        assert_eq!(results[0].response_status, ResponseStatus::Timeout);
        assert!(results[0].agent_response.is_none());
        assert!(results[0].error_message.as_deref().unwrap().contains("did not respond"));
        assert!(runner.grading().summarize(&run.id).await.unwrap().total_scores == 0);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let runner = runner_with(repo.clone(), Duration::from_secs(5));
        let server = echo_agent().await;
        let tc = seed(repo.as_ref(), "Hello", "hello").await;

        let run = runner.submit(new_run(vec![tc.id.clone()], server.uri())).await.unwrap();
        runner.start(&run.id).await.unwrap();

        let err = runner.start(&run.id).await.unwrap_err();
        assert!(matches!(err, EvalError::RunAlreadyStarted { ref status, .. } if status == "completed"));
        assert_eq!(runner.list_results(&run.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_unknown_run_is_not_found() {
        let runner = runner_with(Arc::new(MemoryRepository::new()), Duration::from_secs(5));
        assert!(matches!(runner.start("nope").await, Err(EvalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let runner = runner_with(Arc::new(MemoryRepository::new()), Duration::from_secs(5));
        let ok_url = "http://localhost:9000/evaluate".to_string();

        let empty = runner.submit(new_run(vec![], ok_url.clone())).await;
        assert!(matches!(empty, Err(EvalError::Validation(_))));

        let bad_url = runner.submit(new_run(vec!["tc".to_string()], "ftp://host/x".to_string())).await;
        assert!(matches!(bad_url, Err(EvalError::Validation(_))));

        let mut unknown = new_run(vec!["tc".to_string()], ok_url);
        unknown.grader_ids.push("llm-judge".to_string());
        assert!(matches!(runner.submit(unknown).await, Err(EvalError::UnknownGrader(id)) if id == "llm-judge"));
        assert!(runner.list_runs(0, 10).await.unwrap().is_empty());
    }

    /// Delegates to a memory repository but fails every result write.
    struct FailingWrites {
        inner: MemoryRepository,
    }

    #[async_trait]
    impl Repository for FailingWrites {
        async fn create_test_case(&self, test_case: &TestCase) -> Result<()> {
            self.inner.create_test_case(test_case).await
        }
        async fn get_test_case(&self, id: &str) -> Result<Option<TestCase>> {
            self.inner.get_test_case(id).await
        }
        async fn list_test_cases(&self, skip: usize, limit: usize) -> Result<Vec<TestCase>> {
            self.inner.list_test_cases(skip, limit).await
        }
        async fn update_test_case(&self, id: &str, update: TestCaseUpdate) -> Result<Option<TestCase>> {
            self.inner.update_test_case(id, update).await
        }
        async fn delete_test_case(&self, id: &str) -> Result<bool> {
            self.inner.delete_test_case(id).await
        }
        async fn create_run(&self, run: &EvaluationRun) -> Result<()> {
            self.inner.create_run(run).await
        }
        async fn get_run(&self, id: &str) -> Result<Option<EvaluationRun>> {
            self.inner.get_run(id).await
        }
        async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<EvaluationRun>> {
            self.inner.list_runs(skip, limit).await
        }
        async fn update_run(&self, id: &str, update: RunUpdate) -> Result<EvaluationRun> {
            self.inner.update_run(id, update).await
        }
        async fn begin_run(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool> {
            self.inner.begin_run(id, started_at).await
        }
        async fn create_result(&self, _result: &EvaluationResult) -> Result<()> {
            Err(EvalError::Validation("disk full".to_string()))
        }
        async fn list_results(&self, run_id: &str) -> Result<Vec<EvaluationResult>> {
            self.inner.list_results(run_id).await
        }
        async fn upsert_score(&self, score: &crate::models::Score) -> Result<()> {
            self.inner.upsert_score(score).await
        }
        async fn list_scores(&self, result_id: &str) -> Result<Vec<crate::models::Score>> {
            self.inner.list_scores(result_id).await
        }
        async fn list_all_scores(&self, run_id: &str) -> Result<Vec<crate::models::Score>> {
            self.inner.list_all_scores(run_id).await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_marks_run_failed() {
        let repo: Arc<dyn Repository> = Arc::new(FailingWrites {
            inner: MemoryRepository::new(),
        });
        let runner = runner_with(repo.clone(), Duration::from_secs(5));
        let server = echo_agent().await;
        let tc = seed(repo.as_ref(), "Hello", "hello").await;

        let run = runner.submit(new_run(vec![tc.id.clone()], server.uri())).await.unwrap();
        let err = runner.start(&run.id).await.unwrap_err();
        assert!(matches!(err, EvalError::Orchestration { .. }));

        let failed = runner.get_run(&run.id).await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.result_count, 0);
        assert!(failed.error_message.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_run_lifecycle_on_sqlite() {
        let repo: Arc<dyn Repository> = Arc::new(crate::database::SqliteRepository::in_memory().await.unwrap());
        let runner = runner_with(repo.clone(), Duration::from_secs(5));
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "hello"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let tc = seed(repo.as_ref(), "Hello", "hello").await;

        let run = runner.submit(new_run(vec![tc.id.clone()], server.uri())).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.started_at.is_none());
        assert!(run.completed_at.is_none());

        let handle = tokio::spawn({
            let runner = runner.clone();
            let run_id = run.id.clone();
            async move { runner.start(&run_id).await }
        });

        let mut running = None;
        for _ in 0..100 {
            let current = runner.get_run(&run.id).await.unwrap();
            if current.status == RunStatus::Running {
                running = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let running = running.expect("run never observed as running");
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());
        assert_eq!(running.result_count, 0);

        let done = handle.await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.result_count, 1);
        let started_at = done.started_at.unwrap();
        let completed_at = done.completed_at.unwrap();
        assert!(started_at >= done.created_at);
        assert!(completed_at >= started_at);

        let results = runner.list_results(&run.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].response_status, ResponseStatus::Success);
        let scores = repo.list_scores(&results[0].id).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores[0].passed);
    }
}
