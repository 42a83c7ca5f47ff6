//! Scenario step execution
//!
//! [`ExecutionContext`] owns the driver for one run. [`FlowExecutor`] walks
//! a scenario's steps against it in order and stops at the first failure.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::TimeoutConfig;
use crate::driver::InteractionDriver;
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{self, Locator};
use crate::spec::{Phase, Scenario, Step, UrlPattern};
use crate::wait::{Deadline, WaitPolicy};

/// One live page for the duration of a scenario run.
///
/// Created by [`acquire`](Self::acquire) and torn down by
/// [`release`](Self::release), which closes the driver exactly once.
pub struct ExecutionContext<D: InteractionDriver> {
    driver: D,
    scenario: String,
    released: bool,
}

impl<D: InteractionDriver> ExecutionContext<D> {
    /// Launch the browser and open the page.
    ///
    /// If either call fails the driver is closed before the error is
    /// returned, so a failed acquisition leaves nothing running.
    pub async fn acquire(mut driver: D, scenario: &str) -> HarnessResult<Self> {
        debug!("Acquiring execution context for '{}'", scenario);

        let opened = match driver.launch().await {
            Ok(()) => driver.new_page().await,
            Err(e) => Err(e),
        };

        if let Err(e) = opened {
            if let Err(close_err) = driver.close().await {
                warn!("Closing driver after failed acquisition: {}", close_err);
            }
            return Err(e);
        }

        Ok(Self {
            driver,
            scenario: scenario.to_string(),
            released: false,
        })
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Close the driver. Consumes the context so it cannot be used again.
    pub async fn release(mut self) -> HarnessResult<()> {
        self.released = true;
        debug!("Releasing execution context for '{}'", self.scenario);
        self.driver.close().await
    }
}

impl<D: InteractionDriver> Drop for ExecutionContext<D> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Execution context for '{}' dropped without release, aborting driver",
                self.scenario
            );
            self.driver.abort();
        }
    }
}

/// Per-step record kept for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub phase: Phase,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// How the steps of a scenario ended
#[derive(Debug)]
pub enum Execution {
    /// Every step passed and the terminal URL check (if any) held
    Completed { final_url: String },

    /// `step` is `None` when the failure happened outside the declared steps
    Failed {
        step: Option<usize>,
        reason: HarnessError,
    },
}

#[derive(Debug)]
pub struct ExecutionReport {
    pub execution: Execution,
    pub steps: Vec<StepRecord>,
}

/// Settings shared by all steps of a run
#[derive(Debug, Clone, Default)]
pub struct ExecutorSettings {
    pub timeouts: TimeoutConfig,

    /// Joined to relative `navigate` URLs
    pub base_url: Option<String>,
}

pub struct FlowExecutor {
    settings: ExecutorSettings,
    cancel: CancellationToken,
}

impl FlowExecutor {
    pub fn new(settings: ExecutorSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    /// Run every step of `scenario` in order, stopping at the first failure
    pub async fn execute<D: InteractionDriver>(
        &self,
        scenario: &Scenario,
        ctx: &mut ExecutionContext<D>,
    ) -> ExecutionReport {
        let mut records = Vec::with_capacity(scenario.steps.len());

        for (index, step) in scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let span = info_span!("step", index, phase = %step.phase());
            debug!(parent: &span, "{}", step.name());

            let result = self
                .guarded(self.run_step(ctx.driver(), step))
                .instrument(span)
                .await;

            records.push(StepRecord {
                index,
                name: step.name(),
                phase: step.phase(),
                duration_ms: started.elapsed().as_millis() as u64,
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            if let Err(reason) = result {
                return ExecutionReport {
                    execution: Execution::Failed {
                        step: Some(index),
                        reason,
                    },
                    steps: records,
                };
            }
        }

        let execution = match self.guarded(self.finish(scenario, ctx.driver())).await {
            Ok(final_url) => Execution::Completed { final_url },
            Err(reason) => Execution::Failed { step: None, reason },
        };

        ExecutionReport {
            execution,
            steps: records,
        }
    }

    /// Race a driver operation against cancellation of the run
    async fn guarded<T>(
        &self,
        operation: impl std::future::Future<Output = HarnessResult<T>>,
    ) -> HarnessResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HarnessError::Cancelled),
            result = operation => result,
        }
    }

    /// Terminal URL check, then report where the page ended up
    async fn finish<D: InteractionDriver + ?Sized>(
        &self,
        scenario: &Scenario,
        driver: &mut D,
    ) -> HarnessResult<String> {
        if let Some(pattern) = &scenario.expect_url {
            self.assert_url(driver, pattern, self.settings.timeouts.url_policy())
                .await?;
        }
        driver.current_url().await
    }

    async fn run_step<D: InteractionDriver + ?Sized>(
        &self,
        driver: &mut D,
        step: &Step,
    ) -> HarnessResult<()> {
        let timeouts = &self.settings.timeouts;

        match step {
            Step::Navigate { url } => {
                let url = self.absolute(url);
                driver.goto(&url).await
            }
            Step::Fill { locator, value } => {
                let element = self.resolve(driver, locator).await?;
                driver
                    .fill(&element, value)
                    .await
                    .map_err(|e| attribute_to(e, locator))
            }
            Step::Select { locator, value } => {
                let element = self.resolve(driver, locator).await?;
                driver
                    .select_option(&element, value)
                    .await
                    .map_err(|e| attribute_to(e, locator))
            }
            Step::Click { locator } => {
                let element = self.resolve(driver, locator).await?;
                if !driver.is_visible(&element).await? {
                    return Err(HarnessError::InteractionError {
                        locator: locator.to_string(),
                        reason: "element is not visible".to_string(),
                    });
                }
                driver
                    .click(&element)
                    .await
                    .map_err(|e| attribute_to(e, locator))
            }
            Step::AssertUrl {
                pattern,
                timeout_ms,
            } => {
                let policy = override_timeout(timeouts.url_policy(), *timeout_ms);
                self.assert_url(driver, pattern, policy).await
            }
            Step::AssertVisible {
                locator,
                timeout_ms,
            } => {
                let policy = override_timeout(timeouts.visible_policy(), *timeout_ms);
                self.assert_visible(driver, locator, policy).await
            }
        }
    }

    async fn resolve<D: InteractionDriver + ?Sized>(
        &self,
        driver: &mut D,
        locator: &Locator,
    ) -> HarnessResult<crate::driver::ElementHandle> {
        locator::resolve(
            driver,
            locator,
            self.settings.timeouts.resolve_policy(),
            &self.cancel,
        )
        .await
    }

    async fn assert_url<D: InteractionDriver + ?Sized>(
        &self,
        driver: &mut D,
        pattern: &UrlPattern,
        policy: WaitPolicy,
    ) -> HarnessResult<()> {
        let mut deadline = Deadline::start(policy);

        loop {
            let url = driver.current_url().await?;
            if pattern.matches(&url) {
                debug!("URL {} matches {}", url, pattern);
                return Ok(());
            }

            if !deadline.next_poll(&self.cancel).await? {
                return Err(HarnessError::AssertionTimeout {
                    expected: pattern.to_string(),
                    actual: url,
                    elapsed: deadline.elapsed(),
                });
            }
        }
    }

    async fn assert_visible<D: InteractionDriver + ?Sized>(
        &self,
        driver: &mut D,
        locator: &Locator,
        policy: WaitPolicy,
    ) -> HarnessResult<()> {
        let mut deadline = Deadline::start(policy);

        loop {
            let observed = match locator.select(driver.locate(locator).await?)? {
                None => "not attached",
                Some(element) => match driver.is_visible(&element).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => "hidden",
                    // detached between locate and the visibility check
                    Err(HarnessError::ElementNotFound { .. }) => "detached",
                    Err(e) => return Err(e),
                },
            };

            if !deadline.next_poll(&self.cancel).await? {
                return Err(HarnessError::AssertionTimeout {
                    expected: format!("{} visible", locator),
                    actual: observed.to_string(),
                    elapsed: deadline.elapsed(),
                });
            }
        }
    }

    fn absolute(&self, url: &str) -> String {
        match &self.settings.base_url {
            Some(base) if url.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), url)
            }
            _ => url.to_string(),
        }
    }
}

fn override_timeout(policy: WaitPolicy, timeout_ms: Option<u64>) -> WaitPolicy {
    match timeout_ms {
        Some(ms) => policy.with_timeout(Duration::from_millis(ms)),
        None => policy,
    }
}

/// Drivers report interaction failures against an element handle; name the
/// locator instead so the reason is readable.
fn attribute_to(error: HarnessError, locator: &Locator) -> HarnessError {
    match error {
        HarnessError::InteractionError { reason, .. } => HarnessError::InteractionError {
            locator: locator.to_string(),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, ClickAction, FakeApp, FakeDriver, FakeElement};

    const BASE: &str = "http://localhost:3000";

    fn settings() -> ExecutorSettings {
        ExecutorSettings {
            timeouts: TimeoutConfig::default(),
            base_url: Some(BASE.to_string()),
        }
    }

    fn form_app() -> FakeApp {
        FakeApp::new(BASE).page(
            "/form",
            vec![
                FakeElement::textbox("Name"),
                FakeElement::textbox("Reference").read_only(),
                FakeElement::button("Save").disabled(),
                FakeElement::button("Hidden").hidden(),
                FakeElement::button("Next")
                    .on_click(ClickAction::Navigate("/done".to_string())),
            ],
        )
    }

    async fn run(scenario: &Scenario, driver: FakeDriver) -> ExecutionReport {
        let executor = FlowExecutor::new(settings(), CancellationToken::new());
        let mut ctx = ExecutionContext::acquire(driver, &scenario.name).await.unwrap();
        let report = executor.execute(scenario, &mut ctx).await;
        ctx.release().await.unwrap();
        report
    }

    fn failed_step(report: &ExecutionReport) -> (Option<usize>, &HarnessError) {
        match &report.execution {
            Execution::Failed { step, reason } => (*step, reason),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_run_reports_final_url() {
        let scenario = Scenario::new(
            "next",
            vec![
                Step::navigate("/form"),
                Step::fill(Locator::textbox("Name"), "Ada"),
                Step::click(Locator::button("Next")),
                Step::assert_url(UrlPattern::exact(format!("{}/done", BASE)), None),
            ],
        );

        let report = run(&scenario, FakeDriver::new(form_app())).await;
        match report.execution {
            Execution::Completed { final_url } => assert_eq!(final_url, format!("{}/done", BASE)),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(report.steps.len(), 4);
        assert!(report.steps.iter().all(|s| s.error.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_field_is_interaction_error() {
        let scenario = Scenario::new(
            "readonly",
            vec![
                Step::navigate("/form"),
                Step::fill(Locator::textbox("Reference"), "X-1"),
            ],
        );

        let report = run(&scenario, FakeDriver::new(form_app())).await;
        let (step, reason) = failed_step(&report);
        assert_eq!(step, Some(1));
        match reason {
            HarnessError::InteractionError { locator, .. } => {
                assert_eq!(locator, "textbox named \"Reference\"")
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_on_disabled_or_hidden_element_fails() {
        for name in ["Save", "Hidden"] {
            let scenario = Scenario::new(
                "click",
                vec![Step::navigate("/form"), Step::click(Locator::button(name))],
            );
            let report = run(&scenario, FakeDriver::new(form_app())).await;
            let (step, reason) = failed_step(&report);
            assert_eq!(step, Some(1));
            assert!(matches!(reason, HarnessError::InteractionError { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_fails_after_resolution_window() {
        let scenario = Scenario::new(
            "missing",
            vec![Step::navigate("/form"), Step::click(Locator::button("Delete"))],
        );
        let started = tokio::time::Instant::now();

        let report = run(&scenario, FakeDriver::new(form_app())).await;
        let (_, reason) = failed_step(&report);
        match reason {
            HarnessError::ElementNotFound { waited, .. } => {
                assert_eq!(*waited, Duration::from_millis(5000))
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_url_check_has_no_step_index() {
        let scenario = Scenario::new("stay", vec![Step::navigate("/form")])
            .expecting(UrlPattern::regex("/done$").unwrap());

        let report = run(&scenario, FakeDriver::new(form_app())).await;
        let (step, reason) = failed_step(&report);
        assert_eq!(step, None);
        assert!(matches!(reason, HarnessError::AssertionTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_mid_poll() {
        let scenario = Scenario::new(
            "cancel",
            vec![
                Step::navigate("/form"),
                Step::assert_url(UrlPattern::exact("never"), Some(Duration::from_secs(60))),
                Step::click(Locator::button("Next")),
            ],
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let driver = FakeDriver::new(form_app());
        let log = driver.log();
        let executor = FlowExecutor::new(settings(), cancel);
        let mut ctx = ExecutionContext::acquire(driver, "cancel").await.unwrap();
        let report = executor.execute(&scenario, &mut ctx).await;
        ctx.release().await.unwrap();

        let (step, reason) = failed_step(&report);
        assert_eq!(step, Some(1));
        assert!(matches!(reason, HarnessError::Cancelled));
        assert!(log.clicks().is_empty());
        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn test_dropped_context_aborts_driver() {
        let driver = FakeDriver::new(form_app());
        let log = driver.log();

        let ctx = ExecutionContext::acquire(driver, "dropped").await.unwrap();
        drop(ctx);

        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn test_failed_acquisition_closes_driver() {
        let driver = FakeDriver::new(form_app()).failing_new_page();
        let log = driver.log();

        let result = ExecutionContext::acquire(driver, "broken").await;
        assert!(matches!(result, Err(HarnessError::DriverFault(_))));
        assert_eq!(
            log.calls(),
            vec![Call::Launch, Call::NewPage, Call::Close]
        );
    }
}
