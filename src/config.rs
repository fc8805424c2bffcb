// src/config.rs
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database;
use crate::errors::{EvalError, Result};
use crate::graders::GraderSpec;

/// Where runs, results, scores and test cases are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

/// Application configuration: an optional TOML file, overridden by environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub agent_timeout: Duration,
    pub grader_timeout: Duration,
    pub max_concurrent_runs: usize,
    pub storage: StorageConfig,
    /// Extra grader instances registered on top of the built-in ones.
    pub graders: Vec<GraderSpec>,
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub agent_timeout_secs: Option<u64>,
    #[serde(default)]
    pub grader_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_concurrent_runs: Option<usize>,
    /// `memory` or `sqlite`
    #[serde(default)]
    pub storage: Option<String>,
    /// `sqlite:<path>`
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub graders: Vec<GraderSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            agent_timeout: crate::agent::DEFAULT_AGENT_TIMEOUT,
            grader_timeout: crate::grading::DEFAULT_GRADER_TIMEOUT,
            max_concurrent_runs: 4,
            storage: StorageConfig::Memory,
            graders: Vec::new(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EvalError::Config(format!("{} has an invalid value: '{}'", key, value)))
}

fn non_zero_secs(key: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(EvalError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}

impl AppConfig {
    /// Load configuration from `EVAL_CONFIG_FILE` (if set) and environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match lookup("EVAL_CONFIG_FILE") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        Self::merge(file, lookup)
    }

    fn merge(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = AppConfig::default();

        let host = lookup("BACKEND_HOST").or(file.host).unwrap_or(defaults.host);
        let port = match lookup("BACKEND_PORT") {
            Some(v) => parse_env("BACKEND_PORT", &v)?,
            None => file.port.unwrap_or(defaults.port),
        };

        let agent_timeout = match lookup("AGENT_TIMEOUT") {
            Some(v) => non_zero_secs("AGENT_TIMEOUT", parse_env("AGENT_TIMEOUT", &v)?)?,
            None => match file.agent_timeout_secs {
                Some(secs) => non_zero_secs("agent_timeout_secs", secs)?,
                None => defaults.agent_timeout,
            },
        };
        let grader_timeout = match lookup("GRADER_TIMEOUT") {
            Some(v) => non_zero_secs("GRADER_TIMEOUT", parse_env("GRADER_TIMEOUT", &v)?)?,
            None => match file.grader_timeout_secs {
                Some(secs) => non_zero_secs("grader_timeout_secs", secs)?,
                None => defaults.grader_timeout,
            },
        };

        let max_concurrent_runs = match lookup("MAX_CONCURRENT_RUNS") {
            Some(v) => parse_env("MAX_CONCURRENT_RUNS", &v)?,
            None => file.max_concurrent_runs.unwrap_or(defaults.max_concurrent_runs),
        };
        if max_concurrent_runs == 0 {
            return Err(EvalError::Config("max_concurrent_runs must be at least 1".to_string()));
        }

        let database_url = lookup("DATABASE_URL").or(file.database_url);
        let storage_kind = lookup("EVAL_STORAGE").or(file.storage);
        let storage = match (storage_kind.as_deref(), database_url) {
            (Some("memory"), _) => StorageConfig::Memory,
            (Some("sqlite") | None, Some(url)) => StorageConfig::Sqlite {
                path: database::db_path_from_url(&url)?,
            },
            (Some("sqlite"), None) => StorageConfig::Sqlite {
                path: database::default_db_path(),
            },
            (None, None) => StorageConfig::Memory,
            (Some(other), _) => {
                return Err(EvalError::Config(format!(
                    "Unknown storage '{}'. Use 'memory' or 'sqlite'.",
                    other
                )));
            }
        };

        Ok(AppConfig {
            host,
            port,
            agent_timeout,
            grader_timeout,
            max_concurrent_runs,
            storage,
            graders: file.graders,
        })
    }
}
