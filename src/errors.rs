// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),


    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{kind} with id '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown grader '{0}'")]
    UnknownGrader(String),

    #[error("Evaluation run '{id}' cannot be started: status is {status}")]
    RunAlreadyStarted { id: String, status: String },

    #[error("Evaluation run '{id}' is {status}, expected {expected}")]
    InvalidRunState {
        id: String,
        status: String,
        expected: &'static str,
    },

    #[error("Grader '{grader_id}' failed on result {result_id}: {message}")]
    GraderFailure {
        grader_id: String,
        result_id: String,
        message: String,
    },

    #[error("Evaluation run '{run_id}' failed: {source}")]
    Orchestration {
        run_id: String,
        #[source]
        source: Box<EvalError>,
    },

    #[error("Run dispatcher is not accepting work")]
    DispatcherClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EvalError::NotFound { kind, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

/// Cuts a message down to `max` characters, on a char boundary.
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
