//! Run configuration, loadable from TOML. Every section has defaults, so an
//! empty file is a valid configuration.
use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{determinization::Strategy, Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerKind {
    #[default]
    Ff,
    FastDownward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub kind: PlannerKind,
    /// Defaults to `ff` or `fast-downward.py` on the `PATH`.
    pub binary: Option<PathBuf>,
    /// Extra command line arguments.
    pub args: Vec<String>,
    /// Fast Downward `--search` argument.
    pub search: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            kind: PlannerKind::Ff,
            binary: None,
            args: Vec::new(),
            search: "astar(add())".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeterminizerConfig {
    pub strategy: Strategy,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HindsightConfig {
    /// Rollouts from the current state.
    pub initial_calls: usize,
    /// Rollouts from each candidate's successor; 0 scores by first-round
    /// successes instead.
    pub calls_per_pha: usize,
    /// Score of a failed rollout.
    pub penalty: f64,
}

impl Default for HindsightConfig {
    fn default() -> Self {
        Self {
            initial_calls: 15,
            calls_per_pha: 15,
            penalty: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub timeout_secs: Option<f64>,
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    Simple,
    #[default]
    Hindsight,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentKind,
    pub determinizer: DeterminizerConfig,
    pub hindsight: HindsightConfig,
    pub planner: PlannerConfig,
    pub simulator: SimulatorConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::new(ErrorKind::Config(e.to_string())))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::new(ErrorKind::Io(format!("{}: {}", path.as_ref().display(), e))))?;
        Self::from_toml(&text)
    }
}
