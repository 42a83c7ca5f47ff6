//! Run Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use flowcheck_e2e::target::wait_until_ready;
use flowcheck_e2e::{
    Browser, HarnessConfig, Outcome, PlaywrightDriver, RunReport, ScenarioRunner, SuiteReport,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::{
    print_error, print_json, print_list, print_success, print_warning, OutputFormat, TableDisplay,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run only the named scenario (repeatable)
    #[arg(short, long = "scenario")]
    pub scenarios: Vec<String>,

    /// Run only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Base URL of the application under test
    #[arg(long, env = "FLOWCHECK_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory for screenshots and results
    #[arg(short, long, env = "FLOWCHECK_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory of additional YAML scenarios
    #[arg(long = "scenarios", env = "FLOWCHECK_SCENARIOS")]
    pub scenarios_dir: Option<PathBuf>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, env = "FLOWCHECK_BROWSER")]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Skip the readiness probe
    #[arg(long)]
    pub no_wait_ready: bool,
}

impl RunArgs {
    /// Flags win over the config file
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.scenarios_dir {
            config.scenarios_dir = Some(dir.clone());
        }
        if let Some(browser) = self.browser {
            config.browser.browser = browser;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.no_wait_ready {
            config.target.wait_ready = false;
        }
    }
}

/// One row of the results table
#[derive(Serialize)]
pub struct RunDisplay {
    pub scenario: String,
    pub passed: bool,
    pub failed_step: Option<usize>,
    pub duration_ms: u64,
    pub screenshot: String,
    pub reason: String,
}

impl From<&RunReport> for RunDisplay {
    fn from(report: &RunReport) -> Self {
        let (failed_step, reason) = match &report.outcome {
            Outcome::Success { .. } => (None, String::new()),
            Outcome::Failure {
                reason,
                failed_step,
                ..
            } => (*failed_step, reason.to_string()),
        };
        let screenshot = match &report.screenshot {
            Some(captured) => captured.path.display().to_string(),
            None => "-".to_string(),
        };

        Self {
            scenario: report.scenario.clone(),
            passed: report.outcome.is_success(),
            failed_step,
            duration_ms: report.duration_ms,
            screenshot,
            reason,
        }
    }
}

impl TableDisplay for RunDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Result", "Failed Step", "Duration", "Screenshot", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            if self.passed {
                "✓ Passed".green().to_string()
            } else {
                "✗ Failed".red().to_string()
            },
            self.failed_step
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string()),
            format!("{}ms", self.duration_ms),
            self.screenshot.clone(),
            self.reason.clone(),
        ]
    }
}

/// Run the selected scenarios. Returns whether every one passed.
pub async fn execute(
    args: RunArgs,
    mut config: HarnessConfig,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<bool> {
    args.apply(&mut config);

    let scenarios = super::select(
        super::collect_scenarios(&config)?,
        &args.scenarios,
        args.tag.as_deref(),
    )?;
    if scenarios.is_empty() {
        print_warning("No scenarios matched");
        return Ok(true);
    }

    PlaywrightDriver::check_playwright_installed()?;

    if config.target.wait_ready {
        wait_until_ready(
            &config.target.base_url,
            config.target.ready_policy(),
            &cancel,
        )
        .await
        .context("target is not ready")?;
    }

    info!(
        "Running {} scenario(s) against {} with {}",
        scenarios.len(),
        config.target.base_url,
        config.browser.browser.as_str()
    );

    let runner = ScenarioRunner::new(&config, cancel);
    let suite = runner
        .run_suite(&scenarios, |_| PlaywrightDriver::new(config.browser.clone()))
        .await;
    let results = runner.write_results(&suite)?;

    report(&suite, format);
    if matches!(format, OutputFormat::Table) {
        println!("Results written to {}", results.display());
    }

    Ok(suite.success())
}

fn report(suite: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(suite),
        OutputFormat::Table => {
            let rows: Vec<RunDisplay> = suite.runs.iter().map(RunDisplay::from).collect();
            print_list(&rows, format);

            let summary = format!(
                "{} passed, {} failed, {} skipped ({}ms)",
                suite.passed, suite.failed, suite.skipped, suite.duration_ms
            );
            if suite.success() {
                print_success(&summary);
            } else {
                print_error(&summary);
            }
        }
    }
}
