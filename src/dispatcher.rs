// src/dispatcher.rs
//! Background execution of submitted runs.
//!
//! Submission pushes a run id onto an unbounded channel and returns
//! immediately. A single worker drains the channel and spawns one task per
//! run; a semaphore caps how many runs execute at once.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::errors::{EvalError, Result};
use crate::runner::EvaluationRunner;

#[derive(Clone)]
pub struct RunDispatcher {
    tx: mpsc::UnboundedSender<String>,
}

impl RunDispatcher {
    /// Starts the worker on the current Tokio runtime.
    pub fn spawn(runner: EvaluationRunner, max_concurrent_runs: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(worker(runner, rx, max_concurrent_runs.max(1)));
        (Self { tx }, handle)
    }

    /// Enqueues a run for execution. Never waits on the run itself.
    pub fn submit(&self, run_id: &str) -> Result<()> {
        self.tx
            .send(run_id.to_string())
            .map_err(|_| EvalError::DispatcherClosed)
    }
}

async fn worker(runner: EvaluationRunner, mut rx: mpsc::UnboundedReceiver<String>, max_concurrent_runs: usize) {
    let permits = Arc::new(Semaphore::new(max_concurrent_runs));
    log::info!("Run dispatcher started ({} concurrent runs)", max_concurrent_runs);

    while let Some(run_id) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let runner = runner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match runner.start(&run_id).await {
                Ok(run) => log::info!("Run {} finished as {}", run.id, run.status),
                Err(e) => log::error!("Background evaluation failed: {}", e),
            }
        });
    }

    log::info!("Run dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentClient;
    use crate::graders::GraderRegistry;
    use crate::grading::{GradingStage, DEFAULT_GRADER_TIMEOUT};
    use crate::models::{NewRun, NewTestCase, RunStatus};
    use crate::repository::{MemoryRepository, Repository};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_submitted_run_reaches_terminal_state() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let graders = Arc::new(GraderRegistry::builtin().unwrap());
        let grading = GradingStage::new(repo.clone(), graders.clone(), DEFAULT_GRADER_TIMEOUT);
        let runner = EvaluationRunner::new(
            repo.clone(),
            AgentClient::new(reqwest::Client::new(), Duration::from_secs(5)),
            grading,
            graders,
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Paris"})))
            .mount(&server)
            .await;

        let tc = NewTestCase {
            input: "What is the capital of France?".to_string(),
            expected_output: "Paris".to_string(),
            description: None,
            tags: None,
        }
        .into_test_case()
        .unwrap();
        repo.create_test_case(&tc).await.unwrap();

        let run = runner
            .submit(NewRun {
                test_case_ids: vec![tc.id.clone()],
                agent_endpoint_url: server.uri(),
                grader_ids: vec!["string-match".to_string()],
            })
            .await
            .unwrap();

        let (dispatcher, _handle) = RunDispatcher::spawn(runner.clone(), 2);
        dispatcher.submit(&run.id).unwrap();
        // A duplicate submission is rejected by the runner, not executed twice.
        dispatcher.submit(&run.id).unwrap();

        let mut status = RunStatus::Pending;
        for _ in 0..100 {
            status = runner.get_run(&run.id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, RunStatus::Completed);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.list_results(&run.id).await.unwrap().len(), 1);
    }
}
