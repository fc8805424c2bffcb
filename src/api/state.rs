// src/api/state.rs
use crate::agent::AgentClient;
use crate::config::{AppConfig, StorageConfig};
use crate::database::SqliteRepository;
use crate::dispatcher::RunDispatcher;
use crate::errors::Result;
use crate::graders::GraderRegistry;
use crate::grading::GradingStage;
use crate::repository::{MemoryRepository, Repository};
use crate::runner::EvaluationRunner;
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn Repository>,
    pub runner: EvaluationRunner,
    pub dispatcher: RunDispatcher,
    pub graders: Arc<GraderRegistry>,
}

impl AppState {
    /// Opens storage from the config and wires the pipeline around it.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let repo: Arc<dyn Repository> = match &config.storage {
            StorageConfig::Memory => {
                log::info!("Using in-memory storage");
                Arc::new(MemoryRepository::new())
            }
            StorageConfig::Sqlite { path } => Arc::new(SqliteRepository::open(path).await?),
        };
        Self::with_repository(config, repo)
    }

    /// Wires the pipeline around an existing repository. Must be called inside a Tokio runtime.
    pub fn with_repository(config: AppConfig, repo: Arc<dyn Repository>) -> Result<Self> {
        let mut registry = GraderRegistry::builtin()?;
        for spec in config.graders.clone() {
            log::info!("Registering grader '{}' ({})", spec.id, spec.kind.as_str());
            registry.register_spec(spec)?;
        }
        let graders = Arc::new(registry);

        let grading = GradingStage::new(repo.clone(), graders.clone(), config.grader_timeout);
        let agent = AgentClient::new(Client::new(), config.agent_timeout);
        let runner = EvaluationRunner::new(repo.clone(), agent, grading, graders.clone());
        let (dispatcher, _worker) = RunDispatcher::spawn(runner.clone(), config.max_concurrent_runs);

        Ok(Self {
            config: Arc::new(config),
            repo,
            runner,
            dispatcher,
            graders,
        })
    }
}
