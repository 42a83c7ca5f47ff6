//! List Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use flowcheck_e2e::{HarnessConfig, Scenario};
use serde::Serialize;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Directory of additional YAML scenarios
    #[arg(long = "scenarios", env = "FLOWCHECK_SCENARIOS")]
    pub scenarios_dir: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub steps: usize,
    pub tags: Vec<String>,
    pub description: String,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            steps: scenario.steps.len(),
            tags: scenario.tags.clone(),
            description: scenario.description.clone(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Steps", "Tags", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.steps.to_string(),
            self.tags.join(", "),
            self.description.clone(),
        ]
    }
}

pub fn execute(args: ListArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<()> {
    if let Some(dir) = args.scenarios_dir {
        config.scenarios_dir = Some(dir);
    }

    let scenarios = super::select(super::collect_scenarios(&config)?, &[], args.tag.as_deref())?;
    let rows: Vec<ScenarioDisplay> = scenarios.iter().map(ScenarioDisplay::from).collect();
    print_list(&rows, format);

    Ok(())
}
