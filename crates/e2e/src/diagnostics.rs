//! Screenshot capture at the end of a run

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::driver::InteractionDriver;
use crate::error::HarnessResult;
use crate::executor::ExecutionContext;
use crate::spec::Artifacts;

/// Which fixed path a run's screenshot goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl OutcomeKind {
    pub fn path<'a>(&self, artifacts: &'a Artifacts) -> &'a Path {
        match self {
            OutcomeKind::Success => &artifacts.success,
            OutcomeKind::Failure => &artifacts.error,
        }
    }
}

/// A screenshot that made it to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedScreenshot {
    pub path: PathBuf,
    pub sha256: String,
}

/// Take the run's single screenshot.
///
/// Best effort: any failure is logged and reported as `None`; it never
/// turns a passing run into a failing one or the other way round.
pub async fn capture_on_exit<D: InteractionDriver>(
    ctx: &mut ExecutionContext<D>,
    artifacts: &Artifacts,
    kind: OutcomeKind,
) -> Option<CapturedScreenshot> {
    let path = kind.path(artifacts);

    match capture(ctx.driver(), path).await {
        Ok(captured) => {
            info!("Screenshot saved to {}", captured.path.display());
            Some(captured)
        }
        Err(e) => {
            warn!("Could not capture screenshot {}: {}", path.display(), e);
            None
        }
    }
}

async fn capture<D: InteractionDriver + ?Sized>(
    driver: &mut D,
    path: &Path,
) -> HarnessResult<CapturedScreenshot> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    driver.screenshot(path).await?;

    Ok(CapturedScreenshot {
        path: path.to_path_buf(),
        sha256: hash_file(path)?,
    })
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
