// src/agent.rs

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct AgentRequest<'a> {
    input: &'a str,
}

/// Classified result of one agent call. Latency is measured on every branch.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Success { response: String, latency_ms: u64 },
    Timeout { latency_ms: u64, message: String },
    Error { latency_ms: u64, message: String },
}

impl AgentOutcome {
    pub fn latency_ms(&self) -> u64 {
        match self {
            AgentOutcome::Success { latency_ms, .. }
            | AgentOutcome::Timeout { latency_ms, .. }
            | AgentOutcome::Error { latency_ms, .. } => *latency_ms,
        }
    }
}

/// HTTP client for external agent endpoints. A single attempt per call; no retries.
#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// POSTs `{"input": ...}` to `endpoint` and classifies the reply.
    pub async fn invoke(&self, endpoint: &str, input: &str) -> AgentOutcome {
        let start = Instant::now();
        let result = self.call(endpoint, input).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                log::debug!("Agent call to {} succeeded in {}ms", endpoint, latency_ms);
                AgentOutcome::Success { response, latency_ms }
            }
            Err(CallError::Timeout) => {
                log::warn!("Agent at {} timed out after {}ms", endpoint, latency_ms);
                AgentOutcome::Timeout {
                    latency_ms,
                    message: format!(
                        "Agent did not respond within {} seconds",
                        format_secs(self.timeout)
                    ),
                }
            }
            Err(CallError::Failed(message)) => {
                log::error!("Agent call to {} failed: {}", endpoint, message);
                AgentOutcome::Error { latency_ms, message }
            }
        }
    }

    async fn call(&self, endpoint: &str, input: &str) -> Result<String, CallError> {
        let resp = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .json(&AgentRequest { input })
            .send()
            .await
            .map_err(CallError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(CallError::Failed(format!(
                "Agent returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let bytes = resp.bytes().await.map_err(CallError::from_reqwest)?;
        let reply: Value = serde_json::from_slice(&bytes)
            .map_err(|e| CallError::Failed(format!("Malformed agent reply: {}", e)))?;
        extract_response(reply)
    }
}

/// The reply must be a JSON object; an absent or null `response` reads as empty.
fn extract_response(reply: Value) -> Result<String, CallError> {
    let Value::Object(mut fields) = reply else {
        return Err(CallError::Failed(
            "Malformed agent reply: expected a JSON object".to_string(),
        ));
    };
    match fields.remove("response") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(response)) => Ok(response),
        Some(other) => Err(CallError::Failed(format!(
            "Malformed agent reply: 'response' must be a string, got {}",
            other
        ))),
    }
}

enum CallError {
    Timeout,
    Failed(String),
}

impl CallError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout
        } else {
            CallError::Failed(err.to_string())
        }
    }
}

fn format_secs(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 {
        timeout.as_secs().to_string()
    } else {
        format!("{:.3}", timeout.as_secs_f64())
    }
}
