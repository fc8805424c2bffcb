// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{truncate_message, EvalError, Result};

/// Longest error message kept on a run or result.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;
pub const MAX_TEXT_LEN: usize = 10_000;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_TAGS: usize = 10;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(EvalError::Validation(format!("unknown run status '{}'", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Timeout,
    Error,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Timeout => "timeout",
            ResponseStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseStatus {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(ResponseStatus::Success),
            "timeout" => Ok(ResponseStatus::Timeout),
            "error" => Ok(ResponseStatus::Error),
            other => Err(EvalError::Validation(format!("unknown response status '{}'", other))),
        }
    }
}

/// A single (input, expected output) pair used to probe an agent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub input: String,
    pub expected_output: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewTestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TestCaseUpdate {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_TEXT_LEN {
        return Err(EvalError::Validation(format!(
            "{} must be between 1 and {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(EvalError::Validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
    }
    Ok(())
}

fn validate_tags(tags: Option<&[String]>) -> Result<()> {
    if let Some(tags) = tags {
        if tags.len() > MAX_TAGS {
            return Err(EvalError::Validation(format!("at most {} tags are allowed", MAX_TAGS)));
        }
    }
    Ok(())
}

impl NewTestCase {
    pub fn validate(&self) -> Result<()> {
        validate_text("input", &self.input)?;
        validate_text("expected_output", &self.expected_output)?;
        validate_description(self.description.as_deref())?;
        validate_tags(self.tags.as_deref())
    }

    pub fn into_test_case(self) -> Result<TestCase> {
        self.validate()?;
        let now = Utc::now();
        Ok(TestCase {
            id: new_id(),
            input: self.input,
            expected_output: self.expected_output,
            description: self.description,
            tags: self.tags.unwrap_or_default(),
            created_at: now,
            modified_at: now,
        })
    }
}

impl TestCaseUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(input) = &self.input {
            validate_text("input", input)?;
        }
        if let Some(expected) = &self.expected_output {
            validate_text("expected_output", expected)?;
        }
        validate_description(self.description.as_deref())?;
        validate_tags(self.tags.as_deref())
    }

    /// Applies the set fields and bumps `modified_at`.
    pub fn apply(self, test_case: &mut TestCase) {
        if let Some(input) = self.input {
            test_case.input = input;
        }
        if let Some(expected) = self.expected_output {
            test_case.expected_output = expected;
        }
        if let Some(description) = self.description {
            test_case.description = Some(description);
        }
        if let Some(tags) = self.tags {
            test_case.tags = tags;
        }
        test_case.modified_at = Utc::now().max(test_case.created_at);
    }
}

/// One batch execution of test cases against one agent endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvaluationRun {
    pub id: String,
    pub test_case_ids: Vec<String>,
    pub agent_endpoint_url: String,
    pub grader_ids: Vec<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: u32,
    pub error_message: Option<String>,
}

/// Submission payload for a new run.
#[derive(Debug, Deserialize, Clone)]
pub struct NewRun {
    pub test_case_ids: Vec<String>,
    pub agent_endpoint_url: String,
    pub grader_ids: Vec<String>,
}

impl EvaluationRun {
    pub fn pending(new_run: NewRun) -> Self {
        Self {
            id: new_id(),
            test_case_ids: new_run.test_case_ids,
            agent_endpoint_url: new_run.agent_endpoint_url,
            grader_ids: new_run.grader_ids,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result_count: 0,
            error_message: None,
        }
    }
}

/// Partial update of a run. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: Option<u32>,
    pub error_message: Option<String>,
}

impl RunUpdate {
    pub fn completed(result_count: u32) -> Self {
        Self {
            status: Some(RunStatus::Completed),
            completed_at: Some(Utc::now()),
            result_count: Some(result_count),
            ..Default::default()
        }
    }

    pub fn failed(result_count: u32, message: &str) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            completed_at: Some(Utc::now()),
            result_count: Some(result_count),
            error_message: Some(truncate_message(message, MAX_ERROR_MESSAGE_LEN)),
            ..Default::default()
        }
    }

    pub fn apply(self, run: &mut EvaluationRun) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(started_at) = self.started_at {
            run.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            run.completed_at = Some(completed_at);
        }
        if let Some(count) = self.result_count {
            run.result_count = count;
        }
        if let Some(message) = self.error_message {
            run.error_message = Some(message);
        }
    }
}

/// Record of one agent invocation for one test case within one run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvaluationResult {
    pub id: String,
    pub run_id: String,
    pub test_case_id: String,
    pub agent_response: Option<String>,
    pub response_latency_ms: Option<u64>,
    pub response_status: ResponseStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn new(
        run_id: &str,
        test_case_id: &str,
        agent_response: Option<String>,
        response_latency_ms: Option<u64>,
        response_status: ResponseStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            run_id: run_id.to_string(),
            test_case_id: test_case_id.to_string(),
            agent_response,
            response_latency_ms,
            response_status,
            error_message: error_message.map(|m| truncate_message(&m, MAX_ERROR_MESSAGE_LEN)),
            created_at: Utc::now(),
        }
    }
}

/// Persisted verdict of one grader applied to one result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Score {
    pub id: String,
    pub result_id: String,
    pub grader_id: String,
    pub passed: bool,
    pub score: Option<f64>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Score {
    pub fn new(
        result_id: &str,
        grader_id: &str,
        passed: bool,
        score: Option<f64>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: new_id(),
            result_id: result_id.to_string(),
            grader_id: grader_id.to_string(),
            passed,
            score,
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> NewRun {
        NewRun {
            test_case_ids: vec!["tc-1".to_string()],
            agent_endpoint_url: "http://localhost:9000/evaluate".to_string(),
            grader_ids: vec!["string-match".to_string()],
        }
    }

    #[test]
    fn test_pending_run_defaults() {
        let run = EvaluationRun::pending(new_run());
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.result_count, 0);
        assert!(run.started_at.is_none());
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_failed_update_sets_terminal_fields() {
        let mut run = EvaluationRun::pending(new_run());
        let long = "x".repeat(800);
        RunUpdate::failed(2, &long).apply(&mut run);

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.status.is_terminal());
        assert!(run.completed_at.is_some());
        assert_eq!(run.result_count, 2);
        assert_eq!(run.error_message.unwrap().len(), MAX_ERROR_MESSAGE_LEN);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Completed).unwrap(), "\"completed\"");
        assert_eq!(serde_json::to_string(&ResponseStatus::Timeout).unwrap(), "\"timeout\"");
        assert_eq!("running".parse::<RunStatus>().unwrap(), RunStatus::Running);
        assert!("done".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_new_test_case_validation() {
        let ok = NewTestCase {
            input: "What is the capital of France?".to_string(),
            expected_output: "Paris".to_string(),
            description: None,
            tags: Some(vec!["geography".to_string()]),
        };
        let tc = ok.into_test_case().unwrap();
        assert_eq!(tc.tags, vec!["geography".to_string()]);
        assert_eq!(tc.created_at, tc.modified_at);

        let empty = NewTestCase {
            input: String::new(),
            expected_output: "Paris".to_string(),
            description: None,
            tags: None,
        };
        assert!(matches!(empty.validate(), Err(EvalError::Validation(_))));

        let too_many_tags = NewTestCase {
            input: "a".to_string(),
            expected_output: "b".to_string(),
            description: None,
            tags: Some((0..11).map(|i| i.to_string()).collect()),
        };
        assert!(too_many_tags.validate().is_err());
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut tc = NewTestCase {
            input: "Hello".to_string(),
            expected_output: "hello".to_string(),
            description: Some("greeting".to_string()),
            tags: None,
        }
        .into_test_case()
        .unwrap();

        TestCaseUpdate {
            expected_output: Some("hi".to_string()),
            ..Default::default()
        }
        .apply(&mut tc);

        assert_eq!(tc.input, "Hello");
        assert_eq!(tc.expected_output, "hi");
        assert_eq!(tc.description.as_deref(), Some("greeting"));
        assert!(tc.modified_at >= tc.created_at);
    }
}
