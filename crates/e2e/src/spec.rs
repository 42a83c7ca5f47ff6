//! Declarative scenario definitions
//!
//! Scenarios are either built in code (see [`crate::scenarios`]) or parsed
//! from YAML files. Both end up as the same immutable [`Scenario`] value.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::locator::Locator;

/// A named, ordered sequence of steps verifying one user journey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<Step>,

    /// URL the page must be on once every step has passed
    #[serde(default)]
    pub expect_url: Option<UrlPattern>,

    /// Screenshot paths; derived from the output directory when omitted
    #[serde(default)]
    pub artifacts: Option<Artifacts>,
}

/// Fixed screenshot locations for one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub success: PathBuf,
    pub error: PathBuf,
}

impl Artifacts {
    /// `<dir>/<name>.png` and `<dir>/<name>-error.png`
    pub fn in_dir(dir: &Path, scenario: &str) -> Self {
        Self {
            success: dir.join(format!("{}.png", scenario)),
            error: dir.join(format!("{}-error.png", scenario)),
        }
    }
}

/// One atomic browser action or assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL; relative URLs are joined to the target base URL
    Navigate { url: String },

    /// Clear an editable element and type a value
    Fill { locator: Locator, value: String },

    /// Choose a select option by its exact `value` attribute
    Select { locator: Locator, value: String },

    /// Click a visible, enabled element
    Click { locator: Locator },

    /// Poll the page URL until it matches
    AssertUrl {
        pattern: UrlPattern,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Poll until the element is visible
    AssertVisible {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

/// Phase of a scenario run, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Navigating,
    Filling,
    Selecting,
    Clicking,
    Asserting,
    Terminal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Navigating => "navigating",
            Phase::Filling => "filling",
            Phase::Selecting => "selecting",
            Phase::Clicking => "clicking",
            Phase::Asserting => "asserting",
            Phase::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate { url: url.into() }
    }

    pub fn fill(locator: Locator, value: impl Into<String>) -> Self {
        Step::Fill {
            locator,
            value: value.into(),
        }
    }

    pub fn select(locator: Locator, value: impl Into<String>) -> Self {
        Step::Select {
            locator,
            value: value.into(),
        }
    }

    pub fn click(locator: Locator) -> Self {
        Step::Click { locator }
    }

    pub fn assert_url(pattern: UrlPattern, timeout: Option<Duration>) -> Self {
        Step::AssertUrl {
            pattern,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        }
    }

    pub fn assert_visible(locator: Locator, timeout: Option<Duration>) -> Self {
        Step::AssertVisible {
            locator,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Step::Navigate { .. } => Phase::Navigating,
            Step::Fill { .. } => Phase::Filling,
            Step::Select { .. } => Phase::Selecting,
            Step::Click { .. } => Phase::Clicking,
            Step::AssertUrl { .. } | Step::AssertVisible { .. } => Phase::Asserting,
        }
    }

    /// Short name for logs and reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { locator, .. } => format!("fill:{}", locator),
            Step::Select { locator, value } => format!("select:{}={}", locator, value),
            Step::Click { locator } => format!("click:{}", locator),
            Step::AssertUrl { pattern, .. } => format!("assert_url:{}", pattern),
            Step::AssertVisible { locator, .. } => format!("assert_visible:{}", locator),
        }
    }
}

/// Expected page URL: exact string or regular expression (search semantics)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UrlPatternRepr", into = "UrlPatternRepr")]
pub enum UrlPattern {
    Exact(String),
    Regex(Regex),
}

/// YAML form: `{ exact: <url> }` or `{ regex: <pattern> }`
#[derive(Serialize, Deserialize)]
struct UrlPatternRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
}

impl TryFrom<UrlPatternRepr> for UrlPattern {
    type Error = String;

    fn try_from(repr: UrlPatternRepr) -> Result<Self, Self::Error> {
        match (repr.exact, repr.regex) {
            (Some(url), None) => Ok(UrlPattern::Exact(url)),
            (None, Some(re)) => Regex::new(&re)
                .map(UrlPattern::Regex)
                .map_err(|e| format!("invalid URL pattern '{}': {}", re, e)),
            _ => Err("URL pattern needs exactly one of `exact` or `regex`".to_string()),
        }
    }
}

impl From<UrlPattern> for UrlPatternRepr {
    fn from(pattern: UrlPattern) -> Self {
        match pattern {
            UrlPattern::Exact(url) => UrlPatternRepr {
                exact: Some(url),
                regex: None,
            },
            UrlPattern::Regex(re) => UrlPatternRepr {
                exact: None,
                regex: Some(re.as_str().to_string()),
            },
        }
    }
}

impl UrlPattern {
    pub fn exact(url: impl Into<String>) -> Self {
        UrlPattern::Exact(url.into())
    }

    pub fn regex(pattern: &str) -> HarnessResult<Self> {
        Regex::new(pattern)
            .map(UrlPattern::Regex)
            .map_err(|e| HarnessError::SpecParse(format!("invalid URL pattern '{}': {}", pattern, e)))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Exact(expected) => expected == url,
            UrlPattern::Regex(re) => re.is_match(url),
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::Exact(url) => write!(f, "url {}", url),
            UrlPattern::Regex(re) => write!(f, "url matching /{}/", re.as_str()),
        }
    }
}

/// Application role offered by the login form's role selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    /// Option value in the role `<select>`; also the URL prefix of the role's pages
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            steps,
            expect_url: None,
            artifacts: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn expecting(mut self, pattern: UrlPattern) -> Self {
        self.expect_url = Some(pattern);
        self
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Screenshot paths for this scenario, falling back to `output_dir`
    pub fn artifacts_or(&self, output_dir: &Path) -> Artifacts {
        self.artifacts
            .clone()
            .unwrap_or_else(|| Artifacts::in_dir(output_dir, &self.name))
    }

    /// Structural checks that do not need a browser
    pub fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::SpecParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(HarnessError::SpecParse(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        if !matches!(self.steps.first(), Some(Step::Navigate { .. })) {
            return Err(HarnessError::SpecParse(format!(
                "scenario '{}' must start with a navigate step",
                self.name
            )));
        }
        Ok(())
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| HarnessError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, in path order
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MatchStrategy;

    #[test]
    fn test_parse_reschedule_scenario() {
        let yaml = r#"
name: employee-reschedule
description: Reschedule the first appointment
tags:
  - employee
  - smoke
steps:
  - action: navigate
    url: /login
  - action: fill
    locator:
      by: role
      role: textbox
      name: NHS Email
    value: employee@example.com
  - action: select
    locator:
      by: attribute
      element: select
      name: role
    value: employee
  - action: click
    locator:
      by: role
      role: button
      name: Reschedule
      strategy: first
  - action: assert_url
    pattern:
      regex: '.*/employee/appointments\?reschedule=.*'
    timeout_ms: 5000
  - action: assert_visible
    locator:
      by: role
      role: heading
      name: Date & Time
expect_url:
  regex: '/employee/appointments'
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "employee-reschedule");
        assert_eq!(scenario.steps.len(), 6);

        match &scenario.steps[3] {
            Step::Click { locator } => assert_eq!(locator.strategy, MatchStrategy::First),
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[4] {
            Step::AssertUrl { pattern, timeout_ms } => {
                assert!(pattern.matches("http://localhost:3000/employee/appointments?reschedule=42"));
                assert_eq!(*timeout_ms, Some(5000));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scenario.steps[0].phase(), Phase::Navigating);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let yaml = r#"
name: broken
steps:
  - action: navigate
    url: /
  - action: assert_url
    pattern:
      regex: '(unclosed'
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_scenario_without_steps_is_rejected() {
        let err = Scenario::new("empty", vec![]).validate().unwrap_err();
        assert!(matches!(err, HarnessError::SpecParse(_)));
    }

    #[test]
    fn test_scenario_must_start_with_navigate() {
        let scenario = Scenario::new("clicky", vec![Step::click(Locator::button("Sign In"))]);
        match scenario.validate().unwrap_err() {
            HarnessError::SpecParse(msg) => assert!(msg.contains("navigate")),
            other => panic!("unexpected error {other}"),
        }

        let yaml = r#"
name: clicky
steps:
  - action: click
    locator: { by: role, role: button, name: Sign In }
"#;
        assert!(matches!(
            Scenario::from_yaml(yaml),
            Err(HarnessError::SpecParse(_))
        ));
    }

    #[test]
    fn test_url_pattern_semantics() {
        let exact = UrlPattern::exact("http://localhost:3000/employee/dashboard");
        assert!(exact.matches("http://localhost:3000/employee/dashboard"));
        assert!(!exact.matches("http://localhost:3000/employee/dashboard?tab=1"));

        let re = UrlPattern::regex(".*/admin/users").unwrap();
        assert!(re.matches("http://localhost:3000/admin/users"));
        assert!(!re.matches("http://localhost:3000/admin/dashboard"));
    }

    #[test]
    fn test_default_artifacts_are_per_scenario() {
        let scenario = Scenario::new("admin-navigation", vec![Step::navigate("/login")]);
        let artifacts = scenario.artifacts_or(Path::new("out"));
        assert_eq!(artifacts.success, PathBuf::from("out/admin-navigation.png"));
        assert_eq!(artifacts.error, PathBuf::from("out/admin-navigation-error.png"));
    }
}
