// src/graders/string_match.rs

use serde_json::{json, Map, Value};

use super::{parse_config, warn_unknown_keys, Grader, Normalization, Verdict};
use crate::errors::Result;

const KNOWN_KEYS: &[&str] = &[
    "case_sensitive",
    "caseSensitive",
    "normalize_whitespace",
    "normalizeWhitespace",
];

/// Exact match after optional whitespace and case normalization.
///
/// Config:
/// - `case_sensitive` (default `false`)
/// - `normalize_whitespace` (default `false`): collapse whitespace runs to one
///   space and trim
pub struct StringMatchGrader {
    id: String,
    normalization: Normalization,
    config: Map<String, Value>,
}

impl StringMatchGrader {
    pub fn new(id: &str, normalization: Normalization) -> Self {
        Self {
            id: id.to_string(),
            normalization,
            config: Map::new(),
        }
    }

    pub fn from_config(id: &str, config: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            normalization: parse_config(id, config)?,
            config: config.clone(),
        })
    }
}

impl Default for StringMatchGrader {
    fn default() -> Self {
        Self::new("string-match", Normalization::default())
    }
}

impl Grader for StringMatchGrader {
    fn id(&self) -> &str {
        &self.id
    }

    fn grade(&self, response: &str, expected: &str) -> Result<Verdict> {
        let normalized_expected = self.normalization.apply(expected);
        let normalized_actual = self.normalization.apply(response);
        let passed = normalized_expected == normalized_actual;

        Ok(Verdict {
            passed,
            score: if passed { 1.0 } else { 0.0 },
            details: json!({
                "expected": normalized_expected,
                "actual": normalized_actual,
                "match": if passed { "exact" } else { "mismatch" },
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

    fn grader(case_sensitive: bool, normalize_whitespace: bool) -> StringMatchGrader {
        StringMatchGrader::new(
            "string-match",
            Normalization {
                case_sensitive,
                normalize_whitespace,
            },
        )
    }

    #[test]
    fn test_default_is_case_insensitive() {
        let verdict = StringMatchGrader::default().grade("Hello", "hello").unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.details["match"], "exact");
        assert_eq!(verdict.details["actual"], "hello");
    }

    #[test]
    fn test_case_sensitive_mismatch() {
        let verdict = grader(true, false).grade("Hello", "hello").unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.details["match"], "mismatch");
        assert_eq!(verdict.details["expected"], "hello");
        assert_eq!(verdict.details["actual"], "Hello");
    }

    #[test]
    fn test_whitespace_only_collapsed_when_enabled() {
        assert!(!grader(false, false).grade("  Paris ", "paris").unwrap().passed);
        assert!(grader(false, true).grade("  Paris ", "paris").unwrap().passed);
        assert!(grader(false, true).grade("New\n  York", "new york").unwrap().passed);
    }

    #[test]
    fn test_grade_is_pure() {
        let g = grader(false, true);
        let first = g.grade("The  Answer", "the answer").unwrap();
        let second = g.grade("The  Answer", "the answer").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_config_accepts_camel_case_and_unknown_keys() {
        let config = json!({"caseSensitive": true, "extra": 1});
        let g = StringMatchGrader::from_config("strict", config.as_object().unwrap()).unwrap();
        assert!(g.validate_config());
        assert_eq!(g.id(), "strict");
        assert!(!g.grade("Hello", "hello").unwrap().passed);
    }
}
