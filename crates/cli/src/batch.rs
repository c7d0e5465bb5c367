//! Batch Runner (C6): a bounded worker pool that runs the team
//! orchestrator once per instance against a Docker sandbox, handles
//! per-instance faults without taking down the batch, and halts new
//! scheduling (while letting in-flight instances finish) on a
//! batch-fatal error (§4.6, §8 property 6 and scenario S6).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::sync::Semaphore;

use teamcore_foundation::config::RunPolicy;
use teamcore_foundation::{BatchInstance, Error, HookBus, Result};
use teamcore_orchestrator::Team;
use teamcore_sandbox::{Deployment, DockerDeployment, DockerDeploymentConfig, PullPolicy};

use crate::agents::AgentTemplate;
use crate::predictions;

pub struct BatchRunnerConfig {
    pub team_name: String,
    pub max_consecutive_turns: u32,
    pub output_dir: PathBuf,
    pub raise_exceptions: bool,
    pub redo_existing: bool,
    pub num_workers: usize,
    pub random_delay_multiplier: f64,
    pub default_image: String,
}

/// Runs `instances` through `agent_templates`, one `Team` per instance,
/// bounded to `config.num_workers` concurrent instances. `hooks` is
/// cloned into every `Team` (for `on_step_done`) and also invoked
/// directly around each instance's lifecycle (`on_instance_start`/
/// `on_instance_completed`), matching the split described in §4.7: the
/// orchestrator only ever fires the step-level event.
pub struct BatchRunner {
    instances: Vec<BatchInstance>,
    agent_templates: Vec<AgentTemplate>,
    policy: RunPolicy,
    config: BatchRunnerConfig,
    hooks: Arc<HookBus>,
}

impl BatchRunner {
    pub fn new(instances: Vec<BatchInstance>, agent_templates: Vec<AgentTemplate>, policy: RunPolicy, config: BatchRunnerConfig, hooks: HookBus) -> Self {
        Self { instances, agent_templates, policy, config, hooks: Arc::new(hooks) }
    }

    pub async fn run(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        self.hooks.on_init().await;
        self.hooks.on_run_start().await;

        let num_workers = self.config.num_workers.max(1).min(self.instances.len().max(1));
        let semaphore = Arc::new(Semaphore::new(num_workers));
        let batch_halted = Arc::new(AtomicBool::new(false));

        let mut tasks = FuturesUnordered::new();
        for (index, instance) in self.instances.iter().cloned().enumerate() {
            if batch_halted.load(Ordering::SeqCst) {
                tracing::warn!(instance = %instance.problem.id, "batch halted; skipping remaining instances");
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            // Re-check after acquiring: with a saturated pool, the permit that
            // just freed up may belong to the very instance that halted the
            // batch, so the pre-acquire check above can race past it.
            if batch_halted.load(Ordering::SeqCst) {
                tracing::warn!(instance = %instance.problem.id, "batch halted; skipping remaining instances");
                drop(permit);
                break;
            }
            let runner = self.clone_for_worker();
            let halted = batch_halted.clone();
            let delay_multiplier = self.config.random_delay_multiplier * num_workers as f64;

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                if delay_multiplier > 0.0 {
                    let wait_secs = rand::thread_rng().gen_range(0.0..delay_multiplier);
                    tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
                }
                runner.run_one(index, instance, halted).await
            }));
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "instance failed");
                    errors.push(err);
                }
                Err(join_err) => tracing::error!(error = %join_err, "worker task panicked"),
            }
        }

        self.hooks.on_run_done(&[], &Value::Null).await;

        if self.config.raise_exceptions {
            if let Some(first) = errors.into_iter().next() {
                return Err(first);
            }
        }
        Ok(())
    }

    /// Cheap, `Arc`-backed clone used to move a per-instance worker onto
    /// its own task; `instances`/`agent_templates` are read-only once
    /// the batch starts, so this never needs a lock.
    fn clone_for_worker(&self) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            agent_templates: self.agent_templates.clone(),
            policy: self.policy.clone(),
            team_name: self.config.team_name.clone(),
            max_consecutive_turns: self.config.max_consecutive_turns,
            output_dir: self.config.output_dir.clone(),
            redo_existing: self.config.redo_existing,
            default_image: self.config.default_image.clone(),
            hooks: self.hooks.clone(),
        })
    }
}

/// Everything a single worker needs, cloned out of the owning
/// `BatchRunner` so each spawned task can own it independently.
struct WorkerContext {
    agent_templates: Vec<AgentTemplate>,
    policy: RunPolicy,
    team_name: String,
    max_consecutive_turns: u32,
    output_dir: PathBuf,
    redo_existing: bool,
    default_image: String,
    hooks: Arc<HookBus>,
}

impl WorkerContext {
    async fn run_one(&self, index: usize, instance: BatchInstance, batch_halted: Arc<AtomicBool>) -> Result<()> {
        let problem_id = instance.problem.id.clone();

        if !self.redo_existing && predictions::prediction_exists(&self.output_dir, &problem_id) {
            tracing::info!(instance = %problem_id, "prediction already exists; skipping");
            return Ok(());
        }

        self.hooks.on_instance_start(index, &instance.problem).await;

        let agents = self
            .agent_templates
            .iter()
            .map(|t| t.instantiate(self.policy.max_requeries))
            .collect::<Result<Vec<_>>>()?;

        let mut team = Team::new(
            format!("{}_{}", self.team_name, problem_id),
            agents,
            self.max_consecutive_turns,
            (*self.hooks).clone(),
        );

        let instance_dir = self.output_dir.join(&problem_id);
        std::fs::create_dir_all(&instance_dir)?;
        self.write_replay_config(&instance_dir, &instance)?;

        let image = if instance.sandbox.image.is_empty() { self.default_image.clone() } else { instance.sandbox.image.clone() };
        let mut deployment = DockerDeployment::new(DockerDeploymentConfig {
            image,
            pull_policy: PullPolicy::Missing,
            startup_timeout_secs: instance.sandbox.startup_timeout.unwrap_or(self.policy.startup_timeout_secs),
            remove_image_on_stop: false,
        })?;

        let outcome = self.run_team(&mut team, &instance_dir, &problem_id, &mut deployment).await;
        // stop() must run on every exit path, success or failure.
        let stop_result = deployment.stop().await;
        if let Err(err) = &stop_result {
            tracing::warn!(instance = %problem_id, error = %err, "failed to stop sandbox cleanly");
        }

        match outcome {
            Ok(()) => {
                let result_value = self.instance_result_value(&team, &problem_id);
                self.hooks.on_instance_completed(&result_value).await;
                Ok(())
            }
            Err(err) => {
                if err.is_batch_fatal() {
                    batch_halted.store(true, Ordering::SeqCst);
                }
                let result_value = serde_json::json!({
                    "instance_id": problem_id,
                    "model_patch": team.info().submission,
                    "model_name_or_path": self.team_name,
                    "exit_status": err.exit_status_code(),
                    "error": err.to_string(),
                });
                self.hooks.on_instance_completed(&result_value).await;
                Err(err)
            }
        }
    }

    async fn run_team(&self, team: &mut Team, instance_dir: &std::path::Path, problem_id: &str, deployment: &mut DockerDeployment) -> Result<()> {
        deployment.start().await?;
        team.run(instance_dir, problem_id).await?;
        Ok(())
    }

    fn instance_result_value(&self, team: &Team, problem_id: &str) -> Value {
        let info = team.info();
        serde_json::json!({
            "instance_id": problem_id,
            "model_patch": info.submission,
            "model_name_or_path": self.team_name,
            "exit_status": info.exit_status.clone().unwrap_or_else(|| "submitted".to_string()),
        })
    }

    /// Writes `<problem_id>.config.yaml` so a single instance's run can
    /// be replayed without the rest of the batch (§10 "Replay config").
    fn write_replay_config(&self, instance_dir: &std::path::Path, instance: &BatchInstance) -> Result<()> {
        let path = instance_dir.join(format!("{}.config.yaml", instance.problem.id));
        let text = serde_yaml::to_string(instance).map_err(Error::from)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_value_defaults_exit_status_to_submitted() {
        let hooks = HookBus::new();
        let agents: Vec<Box<dyn teamcore_orchestrator::Agent>> = Vec::new();
        let team = Team::new("t", agents, 1, hooks);
        let ctx = WorkerContext {
            agent_templates: Vec::new(),
            policy: RunPolicy::default(),
            team_name: "team".to_string(),
            max_consecutive_turns: 1,
            output_dir: PathBuf::from("."),
            redo_existing: false,
            default_image: "python:3.11".to_string(),
            hooks: Arc::new(HookBus::new()),
        };
        let value = ctx.instance_result_value(&team, "i1");
        assert_eq!(value["exit_status"], "submitted");
    }
}
