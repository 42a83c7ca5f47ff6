//! Interaction driver boundary
//!
//! The harness never talks to a browser directly. Everything it needs is
//! expressed by [`InteractionDriver`]; the Playwright bridge and the
//! in-memory fake are the two implementations.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;
use crate::locator::Locator;

/// Opaque reference to one element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier, only meaningful to the driver that issued it
    pub id: String,

    /// Short human-readable description for logs and error messages
    #[serde(default)]
    pub description: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "#{}", self.id)
        } else {
            write!(f, "{} (#{})", self.description, self.id)
        }
    }
}

/// Browser automation capability set used by the flow executor.
///
/// A driver instance backs exactly one page in one browser context and is
/// owned by a single [`ExecutionContext`](crate::executor::ExecutionContext)
/// for the lifetime of a run.
#[async_trait]
pub trait InteractionDriver: Send {
    /// Start the browser
    async fn launch(&mut self) -> HarnessResult<()>;

    /// Open the page all subsequent calls act on
    async fn new_page(&mut self) -> HarnessResult<()>;

    /// Load an absolute URL and wait for the load milestone
    async fn goto(&mut self, url: &str) -> HarnessResult<()>;

    /// All elements currently matching the locator's target, in DOM order.
    /// An empty list is not an error.
    async fn locate(&mut self, locator: &Locator) -> HarnessResult<Vec<ElementHandle>>;

    /// Clear the element's value and type `text` into it
    async fn fill(&mut self, element: &ElementHandle, text: &str) -> HarnessResult<()>;

    /// Select the option whose `value` attribute equals `value` exactly
    async fn select_option(&mut self, element: &ElementHandle, value: &str) -> HarnessResult<()>;

    async fn click(&mut self, element: &ElementHandle) -> HarnessResult<()>;

    async fn current_url(&mut self) -> HarnessResult<String>;

    async fn is_visible(&mut self, element: &ElementHandle) -> HarnessResult<bool>;

    /// Full-page screenshot written to `path`
    async fn screenshot(&mut self, path: &Path) -> HarnessResult<()>;

    /// Tear down the page and browser
    async fn close(&mut self) -> HarnessResult<()>;

    /// Synchronous best-effort teardown, used when the owning context is
    /// dropped before [`close`](Self::close) could run
    fn abort(&mut self);
}
