// src/graders/contains.rs

use serde_json::{json, Map, Value};

use super::{parse_config, warn_unknown_keys, Grader, Normalization, Verdict};
use crate::errors::Result;

const KNOWN_KEYS: &[&str] = &[
    "case_sensitive",
    "caseSensitive",
    "normalize_whitespace",
    "normalizeWhitespace",
];

/// Passes when the normalized response contains the normalized expected text.
pub struct ContainsGrader {
    id: String,
    normalization: Normalization,
    config: Map<String, Value>,
}

impl ContainsGrader {
    pub fn from_config(id: &str, config: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            normalization: parse_config(id, config)?,
            config: config.clone(),
        })
    }
}

impl Grader for ContainsGrader {
    fn id(&self) -> &str {
        &self.id
    }

    fn grade(&self, response: &str, expected: &str) -> Result<Verdict> {
        let expected = self.normalization.apply(expected);
        let actual = self.normalization.apply(response);
        let passed = actual.contains(&expected);

        Ok(Verdict {
            passed,
            score: if passed { 1.0 } else { 0.0 },
            details: json!({
                "expected": expected,
                "actual": actual,
                "match": if passed { "contains" } else { "missing" },
            }),
        })
    }

    fn validate_config(&self) -> bool {
        warn_unknown_keys(&self.id, &self.config, KNOWN_KEYS);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_case_insensitive_by_default() {
        let g = ContainsGrader::from_config("contains", &Map::new()).unwrap();
        let verdict = g.grade("The capital of France is PARIS.", "paris").unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.details["match"], "contains");

        let verdict = g.grade("I don't know", "paris").unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.details["match"], "missing");
    }
}
