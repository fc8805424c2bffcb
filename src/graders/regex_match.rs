// src/graders/regex_match.rs

use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_config, warn_unknown_keys, Grader, Verdict};
use crate::errors::{EvalError, Result};

const KNOWN_KEYS: &[&str] = &["case_sensitive", "caseSensitive", "full_match", "fullMatch"];

// Upper bound on compiled pattern size; patterns come from test cases.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RegexConfig {
    #[serde(default = "default_true", alias = "caseSensitive")]
    case_sensitive: bool,
    #[serde(default, alias = "fullMatch")]
    full_match: bool,
}

/// Treats the expected output as a regular expression.
pub struct RegexGrader {
    id: String,
    settings: RegexConfig,
    config: Map<String, Value>,
}

impl RegexGrader {
    pub fn from_config(id: &str, config: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            settings: parse_config(id, config)?,
            config: config.clone(),
        })
    }
}

impl Grader for RegexGrader {
    fn id(&self) -> &str {
        &self.id
    }

    fn grade(&self, response: &str, expected: &str) -> Result<Verdict> {
        let pattern = if self.settings.full_match {
            format!(r"\A(?:{})\z", expected)
        } else {
            expected.to_string()
        };
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(!self.settings.case_sensitive)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| EvalError::Validation(format!("invalid pattern '{}': {}", expected, e)))?;

        let found = re.find(response);
        let passed = found.is_some();

        Ok(Verdict {
            passed,
            score: if passed { 1.0 } else { 0.0 },
            details: json!({
                "pattern": expected,
                "actual": response,
                "match": if passed { "matched" } else { "no_match" },
                "matched_text": found.map(|m| m.as_str()),
            }),
        })
    }

    fn validate_config(&self) -> bool {
        warn_unknown_keys(&self.id, &self.config, KNOWN_KEYS);
        true
    }
}
