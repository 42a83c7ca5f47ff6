//! Flowcheck: browser flow verification
//!
//! This crate drives a real browser against a running web application to
//! confirm that user-facing flows behave as expected:
//! - Declares flows as data ([`Scenario`]s of [`Step`]s), built in code or parsed from YAML
//! - Controls Playwright through a small Node bridge speaking JSON lines
//! - Polls URL and visibility assertions against explicit timeouts
//! - Captures one screenshot per run, on the success or the error path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │    ├── ExecutionContext::acquire(driver)   (Init)           │
//! │    ├── FlowExecutor::execute(scenario)     (steps)          │
//! │    │     ├── locator::resolve  ─┐                           │
//! │    │     └── assert_url/visible ┴─ wait::Deadline           │
//! │    ├── diagnostics::capture_on_exit                         │
//! │    └── ExecutionContext::release           (Terminal)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  InteractionDriver                                          │
//! │    ├── PlaywrightDriver  (node bridge)                      │
//! │    └── FakeDriver        (in-memory, for tests)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fake;
pub mod locator;
pub mod playwright;
pub mod runner;
pub mod scenarios;
pub mod spec;
pub mod target;
pub mod wait;

pub use config::HarnessConfig;
pub use driver::{ElementHandle, InteractionDriver};
pub use error::{HarnessError, HarnessResult};
pub use locator::{Locator, MatchStrategy};
pub use playwright::{Browser, BrowserConfig, PlaywrightDriver};
pub use runner::{Outcome, RunReport, ScenarioRunner, SuiteReport};
pub use spec::{Role, Scenario, Step, UrlPattern};
