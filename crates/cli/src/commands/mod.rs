//! CLI Commands

pub mod list;
pub mod run;

use std::path::Path;

use anyhow::{bail, Context, Result};
use flowcheck_e2e::{scenarios, HarnessConfig, Scenario};
use tracing::debug;

/// Built-in scenarios followed by any YAML scenarios on disk
pub fn collect_scenarios(config: &HarnessConfig) -> Result<Vec<Scenario>> {
    let mut all = scenarios::builtin(config);

    if let Some(dir) = &config.scenarios_dir {
        all.extend(load_dir(dir)?);
    }

    Ok(all)
}

fn load_dir(dir: &Path) -> Result<Vec<Scenario>> {
    if !dir.exists() {
        debug!("Scenario directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    Scenario::load_all(dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))
}

/// Keep scenarios matching every given filter.
///
/// Names must all be known; an empty name list keeps everything.
pub fn select(
    scenarios: Vec<Scenario>,
    names: &[String],
    tag: Option<&str>,
) -> Result<Vec<Scenario>> {
    for name in names {
        if !scenarios.iter().any(|s| &s.name == name) {
            bail!("unknown scenario '{}'", name);
        }
    }

    Ok(scenarios
        .into_iter()
        .filter(|s| names.is_empty() || names.contains(&s.name))
        .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|st| st == t)))
        .collect())
}
