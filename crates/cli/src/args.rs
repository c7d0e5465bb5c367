//! CLI surface (§6.3): the conceptual `RunBatchTeamConfig` flattened
//! onto `clap`. Policy fields (turn limits, timeouts, delay multiplier)
//! are layered defaults < YAML < `TEAMCORE_`-env < these flags, via
//! `teamcore_foundation::config::RunPolicy`; everything below is the
//! "operational" half (paths, worker count, instance source) that
//! `RunPolicy` deliberately does not duplicate.

use std::path::PathBuf;

use clap::Parser;

/// Run a team of agents over a batch of problem instances against a
/// sandboxed execution environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "run-batch-team", version, about)]
pub struct BatchArgs {
    /// Path to the instance source file (JSON array of `BatchInstance`).
    #[arg(long)]
    pub instances: PathBuf,

    /// One YAML file per agent, each containing an `agent:` section.
    #[arg(long = "agent-config", required = true)]
    pub agent_config_paths: Vec<PathBuf>,

    /// Name for the team, used in trajectory file names.
    #[arg(long, default_value = "team")]
    pub team_name: String,

    /// Team-wide default for an agent's consecutive-turn budget before
    /// rotation; individual agent YAML files may override this.
    #[arg(long)]
    pub max_consecutive_turns: Option<u32>,

    /// Output directory. `DEFAULT` resolves to a timestamped directory.
    #[arg(long, default_value = "DEFAULT")]
    pub output_dir: PathBuf,

    /// Suffix appended to the timestamped directory when `output_dir`
    /// is `DEFAULT`.
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Number of parallel instance workers.
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Re-run instances that already have a saved prediction.
    #[arg(long)]
    pub redo_existing: bool,

    /// Propagate per-instance exceptions instead of recording and
    /// continuing with the next instance.
    #[arg(long)]
    pub raise_exceptions: bool,

    /// Upper bound (seconds, scaled by `num_workers`) of the random
    /// per-worker startup delay used to desynchronize sandbox pulls.
    #[arg(long, default_value_t = 0.3)]
    pub random_delay_multiplier: f64,

    /// Show a progress bar. Forced on for multi-worker runs.
    #[arg(long, default_value_t = true)]
    pub progress_bar: bool,

    /// `.env`-style file of environment variables to load before
    /// resolving `RunPolicy`.
    #[arg(long)]
    pub env_var_path: Option<PathBuf>,

    /// Optional agent-policy YAML (see `RunPolicy`) layered under the
    /// flags above and `TEAMCORE_`-prefixed environment variables.
    #[arg(long)]
    pub policy_config: Option<PathBuf>,

    /// Run the evaluator hook at the end of the batch. Mutually
    /// exclusive with `--redo-existing` (§7 ConfigurationError).
    #[arg(long)]
    pub evaluate: bool,

    /// Seconds between continuous-submission evaluator passes; 0 disables.
    #[arg(long, default_value_t = 0)]
    pub continuous_submission_every: u64,

    /// Container image pulled for every instance unless its own
    /// `BatchInstance.sandbox.image` overrides it.
    #[arg(long, default_value = "python:3.11")]
    pub default_image: String,
}
