//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;
use crate::playwright::BrowserConfig;
use crate::scenarios::Accounts;
use crate::wait::WaitPolicy;

/// Top-level configuration, usually read from `flowcheck.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application under test
    pub target: TargetConfig,

    /// Assertion and resolution timeouts
    pub timeouts: TimeoutConfig,

    /// Browser launch options
    pub browser: BrowserConfig,

    /// Credentials for the built-in scenarios
    pub accounts: Accounts,

    /// Where screenshots and results are written
    pub output_dir: PathBuf,

    /// Directory of additional YAML scenarios
    pub scenarios_dir: Option<PathBuf>,
}

/// Application under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL, e.g. `http://localhost:3000`
    pub base_url: String,

    /// Probe the target before running scenarios
    pub wait_ready: bool,

    /// How long to wait for the target to answer
    pub ready_timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            wait_ready: true,
            ready_timeout_ms: 30_000,
        }
    }
}

impl TargetConfig {
    pub fn ready_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(self.ready_timeout_ms),
            Duration::from_millis(250),
        )
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default for `assert_url` steps and the terminal URL check
    pub url_ms: u64,

    /// Default for `assert_visible` steps
    pub visible_ms: u64,

    /// Window for resolving locators of fill/select/click steps
    pub resolve_ms: u64,

    /// Cadence of every poll loop
    pub poll_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            url_ms: 5_000,
            visible_ms: 5_000,
            resolve_ms: 5_000,
            poll_ms: 100,
        }
    }
}

impl TimeoutConfig {
    fn policy(&self, timeout_ms: u64) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(self.poll_ms),
        )
    }

    pub fn url_policy(&self) -> WaitPolicy {
        self.policy(self.url_ms)
    }

    pub fn visible_policy(&self) -> WaitPolicy {
        self.policy(self.visible_ms)
    }

    pub fn resolve_policy(&self) -> WaitPolicy {
        self.policy(self.resolve_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file; defaults when the file does not exist
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config: Self = toml::from_str(&content)?;
            if config.output_dir.as_os_str().is_empty() {
                config.output_dir = default_output_dir();
            }
            Ok(config)
        } else {
            Ok(Self::with_defaults())
        }
    }

    /// Defaults with the output directory filled in
    pub fn with_defaults() -> Self {
        Self {
            output_dir: default_output_dir(),
            ..Self::default()
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test-results")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("flowcheck.toml")).unwrap();
        assert_eq!(config.target.base_url, "http://localhost:3000");
        assert_eq!(config.timeouts, TimeoutConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowcheck.toml");
        std::fs::write(
            &path,
            r#"
[target]
base_url = "http://127.0.0.1:4000"

[timeouts]
url_ms = 10000

[accounts.admin]
email = "ops@example.com"
password = "hunter2"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.target.base_url, "http://127.0.0.1:4000");
        assert!(config.target.wait_ready);
        assert_eq!(config.timeouts.url_ms, 10_000);
        assert_eq!(config.timeouts.poll_ms, 100);
        assert_eq!(config.accounts.admin.email, "ops@example.com");
        assert_eq!(config.accounts.employee.email, "test@nhs.uk");
        assert_eq!(config.accounts.reschedule.email, "employee@example.com");
        assert_eq!(
            config.timeouts.url_policy().timeout,
            Duration::from_secs(10)
        );
    }
}
