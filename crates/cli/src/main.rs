//! `run-batch-team`: drives a team of agents over a batch of problem
//! instances against sandboxed execution environments (§6.3).

mod agents;
mod args;
mod batch;
mod hooks;
mod instances;
mod predictions;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;

use teamcore_foundation::config::RunPolicy;
use teamcore_foundation::{Error, HookBus, Result};

use args::BatchArgs;
use batch::{BatchRunner, BatchRunnerConfig};
use hooks::{EvaluatorHook, NullEvaluatorBackend, PatchSaveHook, ProgressHook, StatusHook};

#[tokio::main]
async fn main() {
    let args = BatchArgs::parse();
    teamcore_foundation::logging::init("info");

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "run-batch-team failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: BatchArgs) -> Result<()> {
    if args.evaluate && args.redo_existing {
        return Err(Error::Configuration(
            "cannot evaluate and redo-existing at the same time: the first preds.json merge would submit stale predictions for instances not yet re-run".to_string(),
        ));
    }

    if let Some(env_path) = &args.env_var_path {
        load_env_file(env_path)?;
    }

    let mut policy = RunPolicy::load(args.policy_config.as_deref())?;
    if let Some(turns) = args.max_consecutive_turns {
        policy.max_consecutive_turns = turns;
    }
    policy.random_delay_multiplier = args.random_delay_multiplier;
    if args.continuous_submission_every > 0 {
        policy.continuous_submission_every = args.continuous_submission_every;
    }
    policy.validate()?;

    let output_dir = resolve_output_dir(&args.output_dir, &args.suffix);
    std::fs::create_dir_all(&output_dir)?;

    let batch_instances = instances::load_instances(&args.instances)?;
    let agent_templates = agents::load_templates(&args.agent_config_paths)?;

    let mut hooks = HookBus::new();
    hooks.register(Arc::new(StatusHook::new(&output_dir)));
    hooks.register(Arc::new(PatchSaveHook::new(output_dir.clone())));
    let progress_enabled = args.progress_bar || args.num_workers > 1;
    hooks.register(Arc::new(ProgressHook::new(batch_instances.len(), progress_enabled)));
    if args.evaluate {
        let merge_lock = Arc::new(Mutex::new(()));
        hooks.register(Arc::new(EvaluatorHook::new(
            Arc::new(NullEvaluatorBackend),
            output_dir.clone(),
            merge_lock,
            policy.continuous_submission_every,
        )));
    }

    let runner = BatchRunner::new(
        batch_instances,
        agent_templates,
        policy.clone(),
        BatchRunnerConfig {
            team_name: args.team_name,
            max_consecutive_turns: args.max_consecutive_turns.unwrap_or(policy.max_consecutive_turns).max(1),
            output_dir,
            raise_exceptions: args.raise_exceptions,
            redo_existing: args.redo_existing,
            num_workers: args.num_workers,
            random_delay_multiplier: args.random_delay_multiplier,
            default_image: args.default_image,
        },
        hooks,
    );

    runner.run().await
}

fn resolve_output_dir(configured: &Path, suffix: &str) -> PathBuf {
    if configured == Path::new("DEFAULT") {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        PathBuf::from("trajectories").join(format!("{stamp}{suffix}"))
    } else {
        configured.to_path_buf()
    }
}

fn load_env_file(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("failed to read env file {}: {e}", path.display())))?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            std::env::set_var(key.trim(), value.trim().trim_matches('"'));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_dir_is_timestamped_under_trajectories() {
        let resolved = resolve_output_dir(Path::new("DEFAULT"), "-run1");
        assert!(resolved.starts_with("trajectories"));
        assert!(resolved.to_string_lossy().ends_with("-run1"));
    }

    #[test]
    fn explicit_output_dir_is_used_verbatim() {
        let resolved = resolve_output_dir(Path::new("/tmp/my-run"), "");
        assert_eq!(resolved, Path::new("/tmp/my-run"));
    }
}
