//! Scenario runner: context lifecycle, execution, diagnostics and reports

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::diagnostics::{capture_on_exit, CapturedScreenshot, OutcomeKind};
use crate::driver::InteractionDriver;
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{
    Execution, ExecutionContext, ExecutionReport, ExecutorSettings, FlowExecutor, StepRecord,
};
use crate::spec::{Phase, Scenario};

/// Terminal result of one scenario run
#[derive(Debug)]
pub enum Outcome {
    Success {
        screenshot: PathBuf,
        final_url: String,
    },
    Failure {
        reason: HarnessError,
        screenshot: PathBuf,
        /// Index of the failing step; `None` for browser startup or the
        /// terminal URL check
        failed_step: Option<usize>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Path the run's screenshot was meant for
    pub fn screenshot(&self) -> &Path {
        match self {
            Outcome::Success { screenshot, .. } | Outcome::Failure { screenshot, .. } => screenshot,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success { .. } => OutcomeKind::Success,
            Outcome::Failure { .. } => OutcomeKind::Failure,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeRepr<'a> {
    Success {
        screenshot: &'a Path,
        final_url: &'a str,
    },
    Failure {
        kind: &'static str,
        reason: String,
        screenshot: &'a Path,
        failed_step: Option<usize>,
    },
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Outcome::Success {
                screenshot,
                final_url,
            } => OutcomeRepr::Success {
                screenshot,
                final_url,
            },
            Outcome::Failure {
                reason,
                screenshot,
                failed_step,
            } => OutcomeRepr::Failure {
                kind: reason.kind(),
                reason: reason.to_string(),
                screenshot,
                failed_step: *failed_step,
            },
        };
        repr.serialize(serializer)
    }
}

/// Everything recorded about one run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: Outcome,
    pub steps: Vec<StepRecord>,
    /// `None` when the screenshot could not be written
    pub screenshot: Option<CapturedScreenshot>,
}

impl RunReport {
    /// Re-raise a failed run as an error
    pub fn into_result(self) -> HarnessResult<Self> {
        if let Outcome::Failure {
            reason,
            failed_step,
            ..
        } = &self.outcome
        {
            let step = match failed_step {
                Some(index) => match self.steps.get(*index) {
                    Some(record) => format!("step {} ({})", index, record.name),
                    None => format!("step {}", index),
                },
                None => "setup or terminal check".to_string(),
            };

            return Err(HarnessError::ScenarioFailed {
                scenario: self.scenario.clone(),
                step,
                reason: reason.to_string(),
            });
        }

        Ok(self)
    }
}

/// Result of running several scenarios
#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Not started because the run was cancelled
    pub skipped: usize,
    pub duration_ms: u64,
    pub runs: Vec<RunReport>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Runs scenarios, each against its own freshly acquired driver
pub struct ScenarioRunner {
    settings: ExecutorSettings,
    output_dir: PathBuf,
    cancel: CancellationToken,
}

impl ScenarioRunner {
    pub fn new(config: &HarnessConfig, cancel: CancellationToken) -> Self {
        Self::with_settings(
            ExecutorSettings {
                timeouts: config.timeouts,
                base_url: Some(config.target.base_url.clone()),
            },
            config.output_dir.clone(),
            cancel,
        )
    }

    pub fn with_settings(
        settings: ExecutorSettings,
        output_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            output_dir,
            cancel,
        }
    }

    /// Run one scenario to a terminal outcome.
    ///
    /// The driver is acquired first and always released before this
    /// returns, whichever way the run ended. Exactly one screenshot is
    /// attempted per run once a page exists.
    pub async fn run<D: InteractionDriver>(&self, scenario: &Scenario, driver: D) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let artifacts = scenario.artifacts_or(&self.output_dir);

        info!(phase = %Phase::Init, "Running scenario '{}'", scenario.name);

        let mut ctx = match ExecutionContext::acquire(driver, &scenario.name).await {
            Ok(ctx) => ctx,
            Err(reason) => {
                error!("✗ {} - could not start browser: {}", scenario.name, reason);
                return RunReport {
                    run_id,
                    scenario: scenario.name.clone(),
                    started_at,
                    duration_ms: start.elapsed().as_millis() as u64,
                    outcome: Outcome::Failure {
                        reason,
                        screenshot: artifacts.error,
                        failed_step: None,
                    },
                    steps: Vec::new(),
                    screenshot: None,
                };
            }
        };

        let executor = FlowExecutor::new(self.settings.clone(), self.cancel.clone());
        let ExecutionReport { execution, steps } = executor.execute(scenario, &mut ctx).await;

        let kind = match &execution {
            Execution::Completed { .. } => OutcomeKind::Success,
            Execution::Failed { .. } => OutcomeKind::Failure,
        };
        let screenshot = capture_on_exit(&mut ctx, &artifacts, kind).await;

        if let Err(e) = ctx.release().await {
            warn!("Closing browser for '{}': {}", scenario.name, e);
        }

        let outcome = match execution {
            Execution::Completed { final_url } => Outcome::Success {
                screenshot: artifacts.success,
                final_url,
            },
            Execution::Failed { step, reason } => Outcome::Failure {
                reason,
                screenshot: artifacts.error,
                failed_step: step,
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Outcome::Success { .. } => {
                info!(phase = %Phase::Terminal, "✓ {} ({} ms)", scenario.name, duration_ms)
            }
            Outcome::Failure {
                reason,
                failed_step,
                ..
            } => error!(
                phase = %Phase::Terminal,
                step = ?failed_step,
                "✗ {} - {}",
                scenario.name,
                reason
            ),
        }

        RunReport {
            run_id,
            scenario: scenario.name.clone(),
            started_at,
            duration_ms,
            outcome,
            steps,
            screenshot,
        }
    }

    /// Run scenarios one after another, each on a new driver from `factory`.
    ///
    /// Each run's context is released before the next is acquired.
    /// Scenarios not yet started when the run is cancelled are skipped.
    pub async fn run_suite<D, F>(&self, scenarios: &[Scenario], mut factory: F) -> SuiteReport
    where
        D: InteractionDriver,
        F: FnMut(&Scenario) -> D,
    {
        let start = Instant::now();
        let mut runs = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            if self.cancel.is_cancelled() {
                break;
            }

            let report = self.run(scenario, factory(scenario)).await;
            if report.outcome.is_success() {
                passed += 1;
            } else {
                failed += 1;
            }
            runs.push(report);
        }

        let skipped = scenarios.len() - runs.len();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        SuiteReport {
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            runs,
        }
    }

    /// Write suite results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteReport) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
