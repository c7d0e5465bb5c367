//! Team Orchestrator (C5): drives the per-instance run loop —
//! scheduler -> agent.step -> propagator -> trajectory append ->
//! termination check — and owns trajectory persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use teamcore_foundation::{Error, HookBus, Result, StepOutput};

use crate::agent::Agent;
use crate::handoff;
use crate::propagator::{propagate_step, SourceContext};
use crate::scheduler::TurnScheduler;

/// The fields a team's run accumulates that do not belong in the
/// step-by-step trajectory itself: the final submission (if any), the
/// terminal exit status, and whatever model-usage stats the acting
/// agent chooses to surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamInfo {
    #[serde(default)]
    pub submission: Option<String>,
    #[serde(default)]
    pub exit_status: Option<String>,
    #[serde(default)]
    pub model_stats: Option<Value>,
}

/// What `Team::run` returns once a `done` step is observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub info: TeamInfo,
    pub trajectory: Vec<StepOutput>,
}

/// The trajectory file's on-disk shape: `{info, trajectory}`, matching
/// what the orchestrator re-reads to verify durability (§8 property 7).
#[derive(Debug, Serialize, Deserialize)]
struct TrajectoryFile<'a> {
    info: &'a TeamInfo,
    trajectory: &'a [StepOutput],
}

/// An ordered roster of agents plus the scheduler and shared trajectory
/// that make them act as one team. Agents are never accessed
/// concurrently: `step()` borrows exactly one at a time for
/// `agent.step()`, then each peer at most once for propagation.
pub struct Team {
    name: String,
    agents: Vec<Box<dyn Agent>>,
    scheduler: TurnScheduler,
    step_count: u64,
    trajectory: Vec<StepOutput>,
    info: TeamInfo,
    traj_path: Option<PathBuf>,
    hooks: HookBus,
}

impl Team {
    /// `default_max_consecutive_turns` is the team-wide fallback; any
    /// agent whose `max_consecutive_turns()` returns `Some` overrides it.
    pub fn new(name: impl Into<String>, agents: Vec<Box<dyn Agent>>, default_max_consecutive_turns: u32, hooks: HookBus) -> Self {
        let names: Vec<String> = agents.iter().map(|a| a.name().to_string()).collect();
        let max_turns = names
            .iter()
            .zip(agents.iter())
            .map(|(n, a)| (n.clone(), a.max_consecutive_turns().unwrap_or(default_max_consecutive_turns)))
            .collect();

        Self {
            name: name.into(),
            agents,
            scheduler: TurnScheduler::new(names, max_turns),
            step_count: 0,
            trajectory: Vec::new(),
            info: TeamInfo::default(),
            traj_path: None,
            hooks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trajectory(&self) -> &[StepOutput] {
        &self.trajectory
    }

    pub fn info(&self) -> &TeamInfo {
        &self.info
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Establishes the shared trajectory path for this instance. Per-agent
    /// sandbox/problem-statement wiring is not part of this crate's agent
    /// contract (§4.2 intentionally stops at `step`/`history`); any agent
    /// that needs the sandbox or problem text receives it from whatever
    /// constructed it, before it was handed to the team.
    pub fn setup(&mut self, output_dir: &Path, problem_id: &str) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        self.traj_path = Some(output_dir.join(format!("{problem_id}_{}.traj.json", self.name)));
        Ok(())
    }

    fn agent_index(&self, name: &str) -> usize {
        self.agents.iter().position(|a| a.name() == name).expect("scheduler returned an unknown agent name")
    }

    /// One team step (§4.4): pick the acting agent, cap its requery
    /// budget, invoke it, detect handoff, propagate into every peer's
    /// history, and append to the shared trajectory.
    pub async fn step(&mut self) -> Result<StepOutput> {
        let acting_name = self.scheduler.next_agent();
        let idx = self.agent_index(&acting_name);

        let configured = self.agents[idx].max_requeries_configured();
        let effective = self.scheduler.effective_max_requeries(&acting_name, configured);

        self.agents[idx].set_max_requeries(effective);
        self.step_count += 1;
        let step_result = self.agents[idx].step().await;
        // Guaranteed restore regardless of success: the next instance (or
        // retry) must never see a narrowed requery budget from this call.
        self.agents[idx].set_max_requeries(configured);
        let step = step_result?;

        let retries = u64::from(step.current_step_retries);
        self.step_count += retries;
        self.scheduler.signal_retry(&acting_name, step.current_step_retries);

        let enable_handoff_tool = self.agents[idx].enable_handoff_tool();
        let is_handoff = handoff::is_handoff(&step, enable_handoff_tool);
        if is_handoff {
            self.scheduler.signal_handoff(&acting_name);
        }

        let broadcast = broadcast_view(&acting_name, &step);
        let src_ctx = SourceContext {
            name: acting_name.clone(),
            templates: self.agents[idx].templates().clone(),
            share_only_tool_results: self.agents[idx].share_only_tool_results(),
            not_using_tools: self.agents[idx].not_using_tools(),
        };

        for j in 0..self.agents.len() {
            if j == idx {
                continue;
            }
            propagate_step(&src_ctx, &broadcast, is_handoff, self.agents[j].as_mut());
        }

        if step.submission.is_some() {
            self.info.submission = step.submission.clone();
        }
        if step.exit_status.is_some() {
            self.info.exit_status = step.exit_status.clone();
        }

        self.trajectory.push(step.clone());
        self.hooks.on_step_done(&step, &serde_json::to_value(&self.info).unwrap_or(Value::Null)).await;

        Ok(step)
    }

    pub fn save_trajectory(&self) -> Result<()> {
        let Some(path) = &self.traj_path else {
            return Err(Error::Internal("save_trajectory called before setup".into()));
        };
        let file = TrajectoryFile { info: &self.info, trajectory: &self.trajectory };
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn trajectory_path(&self) -> Option<&Path> {
        self.traj_path.as_deref()
    }

    /// Runs `step()` to completion, saving the trajectory after every
    /// step so a crash mid-run still leaves a parseable file on disk
    /// (§8 property 7). `on_run_start`/`on_run_done` are batch-wide
    /// events fired once by whatever drives many `Team`s (see the batch
    /// runner), not per instance, so this loop only ever triggers
    /// `on_step_done`.
    pub async fn run(&mut self, output_dir: &Path, problem_id: &str) -> Result<AgentRunResult> {
        self.setup(output_dir, problem_id)?;

        loop {
            let step = self.step().await?;
            self.save_trajectory()?;
            if step.done {
                break;
            }
        }

        Ok(AgentRunResult { info: self.info.clone(), trajectory: self.trajectory.clone() })
    }
}

/// A detached copy of `step` with `output` rewritten to carry the
/// source agent's attribution, used only for propagation — the
/// source's own trajectory entry (already pushed) is untouched.
fn broadcast_view(src_name: &str, step: &StepOutput) -> StepOutput {
    let mut view = step.clone();
    view.output = format!("[{src_name}]: {}", step.thought);
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedAgent;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn step(done: bool) -> StepOutput {
        StepOutput {
            thought: "thinking".to_string(),
            action: "ls".to_string(),
            output: String::new(),
            observation: String::new(),
            tool_calls: None,
            tool_call_ids: None,
            state: HashMap::new(),
            submission: None,
            exit_status: None,
            done,
            current_step_retries: 0,
        }
    }

    #[tokio::test]
    async fn rotation_fairness_s1() {
        let a_steps: Vec<StepOutput> = (0..4).map(|i| step(i == 3)).collect();
        let b_steps: Vec<StepOutput> = (0..4).map(|_| step(false)).collect();
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(ScriptedAgent::new("A", a_steps).max_consecutive_turns(2)),
            Box::new(ScriptedAgent::new("B", b_steps).max_consecutive_turns(2)),
        ];
        let mut team = Team::new("t", agents, 2, HookBus::new());
        let dir = tempdir().unwrap();
        team.setup(dir.path(), "p1").unwrap();

        loop {
            let s = team.step().await.unwrap();
            if s.done {
                break;
            }
        }
        assert_eq!(team.trajectory().len(), 8);
    }

    #[tokio::test]
    async fn handoff_rotates_to_next_agent_immediately() {
        let mut first = step(false);
        first.action = r#"__SPECIAL_TOOL__{"function":{"name":"handoff","arguments":{}}}"#.to_string();
        let a_steps = vec![first, step(false)];
        let b_steps = vec![step(true)];
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(ScriptedAgent::new("A", a_steps).max_consecutive_turns(5)),
            Box::new(ScriptedAgent::new("B", b_steps).max_consecutive_turns(5)),
        ];
        let mut team = Team::new("t", agents, 5, HookBus::new());
        let dir = tempdir().unwrap();
        team.setup(dir.path(), "p1").unwrap();

        team.step().await.unwrap(); // A's handoff step
        let second = team.step().await.unwrap();
        assert!(second.done); // B's only scripted step
    }

    #[tokio::test]
    async fn trajectory_file_round_trips_after_every_step() {
        let agents: Vec<Box<dyn Agent>> =
            vec![Box::new(ScriptedAgent::new("A", vec![step(true)]).max_consecutive_turns(1))];
        let mut team = Team::new("t", agents, 1, HookBus::new());
        let dir = tempdir().unwrap();
        team.setup(dir.path(), "p1").unwrap();
        team.step().await.unwrap();
        team.save_trajectory().unwrap();

        let text = std::fs::read_to_string(team.trajectory_path().unwrap()).unwrap();
        let parsed: TrajectoryFile = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.trajectory.len(), team.trajectory().len());
    }
}
