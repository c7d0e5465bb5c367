//! Wires the orchestrator's `Agent` contract to a concrete
//! implementation for this binary. Real model-backed agents are
//! explicitly out of scope (§1); this binary drives the reference
//! `ScriptedAgent` the orchestrator crate ships for its own tests, so
//! the batch runner is exercisable end-to-end without a live model or
//! sandbox. Each agent YAML carries the same `agent:` section the
//! source's `_load_agent_configs` expects, plus a `script:` path
//! naming a JSON file of pre-recorded `StepOutput`s for that agent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use teamcore_foundation::config::AgentConfig;
use teamcore_foundation::{Error, Result, StepOutput};
use teamcore_orchestrator::{Agent, ScriptedAgent};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentFileShape {
    agent: AgentConfig,
    #[serde(default)]
    script: Option<PathBuf>,
}

/// One agent's fully-resolved template: its config plus the script it
/// replays. Loaded once per `--agent-config` path; `instantiate` is
/// called fresh for every instance so agents are never shared across
/// problems (mirrors the source's `model_copy(deep=True)` per instance).
#[derive(Clone)]
pub struct AgentTemplate {
    pub config: AgentConfig,
    script_path: Option<PathBuf>,
}

impl AgentTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("failed to read agent config {}: {e}", path.display())))?;
        let shape: AgentFileShape = serde_yaml::from_str(&text)
            .map_err(|e| Error::Configuration(format!("invalid agent config {}: {e}", path.display())))?;

        let script_path = shape.script.map(|p| {
            if p.is_absolute() {
                p
            } else {
                path.parent().map(|parent| parent.join(&p)).unwrap_or(p)
            }
        });

        Ok(Self { config: shape.agent, script_path })
    }

    fn load_script(&self) -> Result<Vec<StepOutput>> {
        let Some(path) = &self.script_path else {
            return Ok(Vec::new());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("failed to read agent script {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("invalid agent script {}: {e}", path.display())))
    }

    /// Builds a fresh `Agent` for one instance from this template.
    /// `default_max_requeries` is the `RunPolicy`-layered fallback used
    /// when this agent's own YAML leaves `max_requeries` unset.
    pub fn instantiate(&self, default_max_requeries: u32) -> Result<Box<dyn Agent>> {
        let script = self.load_script()?;
        let mut agent = ScriptedAgent::new(self.config.name.clone(), script)
            .share_only_tool_results(self.config.share_only_tool_results)
            .not_using_tools(self.config.not_using_tools)
            .enable_handoff_tool(self.config.enable_handoff_tool)
            .max_requeries(self.config.max_requeries.unwrap_or(default_max_requeries));
        if let Some(turns) = self.config.max_consecutive_turns {
            agent = agent.max_consecutive_turns(turns);
        }
        Ok(Box::new(agent))
    }
}

pub fn load_templates(paths: &[PathBuf]) -> Result<Vec<AgentTemplate>> {
    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        templates.push(AgentTemplate::load(path)?);
    }
    if templates.is_empty() {
        return Err(Error::Configuration("no valid agent configurations found".to_string()));
    }
    Ok(templates)
}
