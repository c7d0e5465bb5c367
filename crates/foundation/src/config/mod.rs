//! Layered run configuration: defaults < per-agent YAML files <
//! `TEAMCORE_`-prefixed environment variables < CLI flags. This module
//! owns only the "policy" settings shared by the orchestrator and
//! batch runner (turn limits, timeouts, delay multiplier); path/worker
//! operational settings live on the CLI binary's own config struct,
//! which composes `RunPolicy` rather than duplicating it.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENV_PREFIX: &str = "TEAMCORE_";

/// Scheduling/runtime policy shared by every team in a batch. Agent
/// YAML files may each override `max_consecutive_turns` individually;
/// this struct carries the batch-wide default plus sandbox/timeout
/// knobs that apply uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPolicy {
    #[serde(default = "default_max_consecutive_turns")]
    pub max_consecutive_turns: u32,
    #[serde(default = "default_max_requeries")]
    pub max_requeries: u32,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_random_delay_multiplier")]
    pub random_delay_multiplier: f64,
    #[serde(default)]
    pub continuous_submission_every: u64,
}

fn default_max_consecutive_turns() -> u32 {
    1
}
fn default_max_requeries() -> u32 {
    3
}
fn default_startup_timeout() -> u64 {
    180
}
fn default_random_delay_multiplier() -> f64 {
    1.0
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_turns: default_max_consecutive_turns(),
            max_requeries: default_max_requeries(),
            startup_timeout_secs: default_startup_timeout(),
            random_delay_multiplier: default_random_delay_multiplier(),
            continuous_submission_every: 0,
        }
    }
}

impl RunPolicy {
    /// Load defaults, then overlay a YAML file if present, then overlay
    /// `TEAMCORE_`-prefixed environment variables. CLI flags are applied
    /// by the caller afterward via the setter methods below, since clap
    /// parsing lives in the CLI crate.
    pub fn load(yaml_path: Option<&Path>) -> Result<Self> {
        let mut policy = Self::default();
        if let Some(path) = yaml_path {
            let text = std::fs::read_to_string(path)?;
            let from_file: Self = serde_yaml::from_str(&text)?;
            policy = from_file;
        }
        policy.apply_env(&std::env::vars().collect());
        Ok(policy)
    }

    fn apply_env(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = vars.get(&format!("{ENV_PREFIX}MAX_CONSECUTIVE_TURNS")) {
            if let Ok(n) = v.parse() {
                self.max_consecutive_turns = n;
            }
        }
        if let Some(v) = vars.get(&format!("{ENV_PREFIX}MAX_REQUERIES")) {
            if let Ok(n) = v.parse() {
                self.max_requeries = n;
            }
        }
        if let Some(v) = vars.get(&format!("{ENV_PREFIX}STARTUP_TIMEOUT_SECS")) {
            if let Ok(n) = v.parse() {
                self.startup_timeout_secs = n;
            }
        }
        if let Some(v) = vars.get(&format!("{ENV_PREFIX}RANDOM_DELAY_MULTIPLIER")) {
            if let Ok(n) = v.parse() {
                self.random_delay_multiplier = n;
            }
        }
        if let Some(v) = vars.get(&format!("{ENV_PREFIX}CONTINUOUS_SUBMISSION_EVERY")) {
            if let Ok(n) = v.parse() {
                self.continuous_submission_every = n;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_turns == 0 {
            return Err(Error::Configuration("max_consecutive_turns must be >= 1".into()));
        }
        Ok(())
    }
}

/// One agent's YAML configuration file, named by `agent_config_paths`.
/// The fields map directly onto the agent contract's configuration
/// flags (§4.2); orchestrator-internal fields like `history` are not
/// part of this file, since they are runtime state, not config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub max_requeries: Option<u32>,
    #[serde(default)]
    pub share_only_tool_results: bool,
    #[serde(default)]
    pub not_using_tools: bool,
    #[serde(default)]
    pub max_consecutive_turns: Option<u32>,
    #[serde(default)]
    pub enable_handoff_tool: bool,
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let mut vars = HashMap::new();
        vars.insert("TEAMCORE_MAX_CONSECUTIVE_TURNS".to_string(), "5".to_string());
        let mut policy = RunPolicy::default();
        policy.apply_env(&vars);
        assert_eq!(policy.max_consecutive_turns, 5);
    }

    #[test]
    fn zero_turns_fails_validation() {
        let mut policy = RunPolicy::default();
        policy.max_consecutive_turns = 0;
        assert!(policy.validate().is_err());
    }
}
