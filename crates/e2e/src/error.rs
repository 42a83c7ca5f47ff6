//! Error types for flow verification

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Element not found: {locator} (waited {waited:?})")]
    ElementNotFound { locator: String, waited: Duration },

    #[error("Ambiguous match: {locator} matched {count} elements but a unique match was required")]
    AmbiguousMatch { locator: String, count: usize },

    #[error("Element not interactable: {locator} - {reason}")]
    InteractionError { locator: String, reason: String },

    #[error("Timed out after {elapsed:?}: expected {expected}, last observed {actual}")]
    AssertionTimeout {
        expected: String,
        actual: String,
        elapsed: Duration,
    },

    #[error("Driver fault: {0}")]
    DriverFault(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Target {url} not reachable after {attempts} attempts")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Scenario '{scenario}' failed at {step}: {reason}")]
    ScenarioFailed {
        scenario: String,
        step: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Stable label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::ElementNotFound { .. } => "element_not_found",
            HarnessError::AmbiguousMatch { .. } => "ambiguous_match",
            HarnessError::InteractionError { .. } => "interaction_error",
            HarnessError::AssertionTimeout { .. } => "assertion_timeout",
            HarnessError::DriverFault(_) => "driver_fault",
            HarnessError::Cancelled => "cancelled",
            HarnessError::PlaywrightNotFound => "playwright_not_found",
            HarnessError::SpecParse(_) => "spec_parse",
            HarnessError::TargetUnreachable { .. } => "target_unreachable",
            HarnessError::ScenarioFailed { .. } => "scenario_failed",
            HarnessError::Io(_) => "io",
            HarnessError::Json(_) => "json",
            HarnessError::Yaml(_) => "yaml",
            HarnessError::Toml(_) => "config",
            HarnessError::Http(_) => "http",
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_timeout_message_carries_both_values() {
        let err = HarnessError::AssertionTimeout {
            expected: "url matching /admin/users".to_string(),
            actual: "http://localhost:3000/admin/dashboard".to_string(),
            elapsed: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("/admin/users"));
        assert!(msg.contains("/admin/dashboard"));
        assert_eq!(err.kind(), "assertion_timeout");
    }
}
