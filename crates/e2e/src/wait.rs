//! Bounded polling for assertions and element resolution
//!
//! All temporal tolerance in a run goes through here: a condition is
//! re-checked on a fixed cadence until it holds or the timeout elapses.
//! There is no retry with backoff. Waits observe the run's cancellation
//! token and return [`HarnessError::Cancelled`] as soon as it fires.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{HarnessError, HarnessResult};

/// Timeout and cadence for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Same cadence, different timeout
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Result of evaluating a condition once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    Satisfied(T),
    /// Not yet; `observed` describes what was seen instead
    Unsatisfied { observed: String },
}

/// Terminal result of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Satisfied(T),
    TimedOut { observed: String, elapsed: Duration },
}

/// Deadline for a poll loop that needs to borrow its probe target mutably
/// between checks (the driver, typically).
///
/// ```ignore
/// let mut deadline = Deadline::start(policy);
/// loop {
///     if condition(&mut driver).await? { break; }
///     if !deadline.next_poll(&cancel).await? { /* timed out */ }
/// }
/// ```
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    policy: WaitPolicy,
}

impl Deadline {
    pub fn start(policy: WaitPolicy) -> Self {
        Self {
            started: Instant::now(),
            policy,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sleep until the next check is due.
    ///
    /// Returns `Ok(false)` once the deadline has passed and no further
    /// check should be made. The sleep is clamped to the remaining time so
    /// the final check lands on the deadline itself.
    pub async fn next_poll(&mut self, cancel: &CancellationToken) -> HarnessResult<bool> {
        let elapsed = self.elapsed();
        if elapsed >= self.policy.timeout {
            return Ok(false);
        }

        let remaining = self.policy.timeout - elapsed;
        let pause = self.policy.poll_interval.min(remaining);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HarnessError::Cancelled),
            _ = sleep(pause) => Ok(true),
        }
    }
}

/// Poll `probe` until it reports [`Check::Satisfied`] or the policy's
/// timeout elapses.
///
/// Errors returned by the probe abort the wait immediately.
pub async fn wait_for<T, F, Fut>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> HarnessResult<WaitOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<Check<T>>>,
{
    let mut deadline = Deadline::start(policy);

    loop {
        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled);
        }

        let observed = match probe().await? {
            Check::Satisfied(value) => return Ok(WaitOutcome::Satisfied(value)),
            Check::Unsatisfied { observed } => observed,
        };

        if !deadline.next_poll(cancel).await? {
            return Ok(WaitOutcome::TimedOut {
                observed,
                elapsed: deadline.elapsed(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn policy(timeout_ms: u64, poll_ms: u64) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_on_first_check_returns_without_sleeping() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let outcome = wait_for(policy(1000, 100), &cancel, || async {
            Ok(Check::Satisfied(7))
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Satisfied(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline_with_last_observation() {
        let cancel = CancellationToken::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();

        let outcome = wait_for(policy(1000, 300), &cancel, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<Check<()>, HarnessError>(Check::Unsatisfied {
                    observed: format!("check {}", n),
                })
            }
        })
        .await
        .unwrap();

        // checks at 0, 300, 600, 900 and the clamped final one at 1000
        assert_eq!(checks.load(Ordering::SeqCst), 5);
        match outcome {
            WaitOutcome::TimedOut { observed, elapsed } => {
                assert_eq!(observed, "check 4");
                assert_eq!(elapsed, Duration::from_millis(1000));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_satisfied_midway() {
        let cancel = CancellationToken::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();

        let outcome = wait_for(policy(5000, 100), &cancel, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n >= 3 {
                    Ok(Check::Satisfied(n))
                } else {
                    Ok(Check::Unsatisfied {
                        observed: "not yet".to_string(),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Satisfied(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_aborts_wait() {
        let cancel = CancellationToken::new();
        let result = wait_for(policy(5000, 100), &cancel, || async {
            Err::<Check<()>, _>(HarnessError::DriverFault("bridge gone".to_string()))
        })
        .await;

        assert!(matches!(result, Err(HarnessError::DriverFault(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let start = Instant::now();

        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let result = wait_for(policy(60_000, 100), &cancel, || async {
            Ok::<Check<()>, HarnessError>(Check::Unsatisfied {
                observed: "pending".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(HarnessError::Cancelled)));
        assert!(start.elapsed() < Duration::from_millis(400));
    }
}
