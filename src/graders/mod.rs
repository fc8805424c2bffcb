// src/graders/mod.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{EvalError, Result};

pub mod contains;
pub mod regex_match;
pub mod string_match;

pub use contains::ContainsGrader;
pub use regex_match::RegexGrader;
pub use string_match::StringMatchGrader;

/// In-memory outcome of one grader call, before it is persisted as a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    /// Always within `0.0..=1.0`.
    pub score: f64,
    pub details: Value,
}

/// A pluggable verdict function comparing an agent response to an expected output.
///
/// Implementations run on the blocking thread pool, so `grade` may be CPU
/// bound. Errors returned here are isolated to the (result, grader) pair.
pub trait Grader: Send + Sync {
    fn id(&self) -> &str;

    fn grade(&self, response: &str, expected: &str) -> Result<Verdict>;

    /// Self-check of the configuration. Unknown keys are logged, not rejected.
    fn validate_config(&self) -> bool;
}

/// Text normalization shared by the string-based graders.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Normalization {
    #[serde(default, alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default, alias = "normalizeWhitespace")]
    pub normalize_whitespace: bool,
}

impl Normalization {
    pub fn apply(&self, text: &str) -> String {
        let text = if self.normalize_whitespace {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            text.to_string()
        };
        if self.case_sensitive {
            text
        } else {
            text.to_lowercase()
        }
    }
}

/// Warns about config keys a grader does not understand.
pub(crate) fn warn_unknown_keys(grader_id: &str, config: &Map<String, Value>, known: &[&str]) {
    for key in config.keys() {
        if !known.contains(&key.as_str()) {
            log::warn!("Grader '{}': unknown config key '{}'", grader_id, key);
        }
    }
}

pub(crate) fn parse_config<T: for<'de> Deserialize<'de>>(
    grader_id: &str,
    config: &Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(config.clone()))
        .map_err(|e| EvalError::Config(format!("invalid config for grader '{}': {}", grader_id, e)))
}

/// The closed set of grader implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraderKind {
    StringMatch,
    Contains,
    Regex,
}

impl GraderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraderKind::StringMatch => "string-match",
            GraderKind::Contains => "contains",
            GraderKind::Regex => "regex",
        }
    }

    pub fn build(&self, id: &str, config: &Map<String, Value>) -> Result<Arc<dyn Grader>> {
        let grader: Arc<dyn Grader> = match self {
            GraderKind::StringMatch => Arc::new(StringMatchGrader::from_config(id, config)?),
            GraderKind::Contains => Arc::new(ContainsGrader::from_config(id, config)?),
            GraderKind::Regex => Arc::new(RegexGrader::from_config(id, config)?),
        };
        if !grader.validate_config() {
            return Err(EvalError::Config(format!("grader '{}' rejected its configuration", id)));
        }
        Ok(grader)
    }
}

/// Declarative grader registration, as read from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct GraderSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: GraderKind,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Catalog entry returned by the graders API.
#[derive(Debug, Clone, Serialize)]
pub struct GraderInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Map<String, Value>,
}

struct Registered {
    info: GraderInfo,
    instance: Arc<dyn Grader>,
}

/// Graders known to this process, keyed by id. Built once at startup.
#[derive(Default)]
pub struct GraderRegistry {
    entries: HashMap<String, Registered>,
    order: Vec<String>,
}

impl GraderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default catalog: one instance of each built-in kind.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        let defaults = [
            (
                GraderKind::StringMatch,
                "String Match",
                "Case-insensitive string matching grader",
            ),
            (
                GraderKind::Contains,
                "Contains",
                "Passes when the response contains the expected output",
            ),
            (
                GraderKind::Regex,
                "Regex",
                "Treats the expected output as a regular expression",
            ),
        ];
        for (kind, name, description) in defaults {
            registry.register_spec(GraderSpec {
                id: kind.as_str().to_string(),
                name: Some(name.to_string()),
                description: Some(description.to_string()),
                kind,
                config: Map::new(),
            })?;
        }
        Ok(registry)
    }

    pub fn register_spec(&mut self, spec: GraderSpec) -> Result<()> {
        let instance = spec.kind.build(&spec.id, &spec.config)?;
        let info = GraderInfo {
            name: spec.name.unwrap_or_else(|| spec.id.clone()),
            description: spec.description.unwrap_or_default(),
            kind: spec.kind.as_str().to_string(),
            config: spec.config,
            id: spec.id,
        };
        self.insert(info, instance);
        Ok(())
    }

    /// Registers an already built grader under its own id.
    pub fn register(&mut self, kind: &str, description: &str, instance: Arc<dyn Grader>) {
        let info = GraderInfo {
            id: instance.id().to_string(),
            name: instance.id().to_string(),
            description: description.to_string(),
            kind: kind.to_string(),
            config: Map::new(),
        };
        self.insert(info, instance);
    }

    fn insert(&mut self, info: GraderInfo, instance: Arc<dyn Grader>) {
        let id = info.id.clone();
        if self.entries.insert(id.clone(), Registered { info, instance }).is_some() {
            log::warn!("Grader '{}' registered twice; keeping the latest", id);
        } else {
            self.order.push(id);
        }
    }

    pub fn resolve(&self, grader_id: &str) -> Option<Arc<dyn Grader>> {
        self.entries.get(grader_id).map(|r| Arc::clone(&r.instance))
    }

    pub fn is_known(&self, grader_id: &str) -> bool {
        self.entries.contains_key(grader_id)
    }

    pub fn get(&self, grader_id: &str) -> Option<&GraderInfo> {
        self.entries.get(grader_id).map(|r| &r.info)
    }

    /// Catalog in registration order.
    pub fn list(&self) -> Vec<&GraderInfo> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }
}
