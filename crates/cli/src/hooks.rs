//! Hooks registered on the batch-wide `HookBus`: a progress bar, an
//! exit-status YAML writer, a prediction-save hook, and the evaluator
//! hook with its continuous-submission pass (§10 "Supplemented
//! Features"). None of these know anything about a specific agent or
//! sandbox; they only see what `RunHook`'s fixed signature hands them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use teamcore_foundation::{Error, ProblemStatement, Result, RunHook, StepOutput};

use crate::predictions::{self, MergeLock, Prediction};

/// Renders a single `indicatif` bar across the whole batch, advancing it
/// on every instance completion. Multi-worker runs always show one
/// (§6.3 "progress_bar ... always shown for multi-worker runs").
pub struct ProgressHook {
    bar: ProgressBar,
}

impl ProgressHook {
    pub fn new(total_instances: usize, enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(total_instances as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} instances ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }
}

#[async_trait]
impl RunHook for ProgressHook {
    async fn on_instance_completed(&self, _result: &Value) -> Result<()> {
        self.bar.inc(1);
        Ok(())
    }

    async fn on_run_done(&self, _trajectory: &[StepOutput], _info: &Value) -> Result<()> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

/// Tracks each instance's current status string and writes it to
/// `run_batch_team_exit_statuses.yaml` after every change, mirroring the
/// original's `SetStatusAgentHook` but at instance granularity since
/// this crate's `RunHook` surface does not carry a per-step instance id.
pub struct StatusHook {
    path: PathBuf,
    statuses: Mutex<BTreeMap<String, String>>,
}

impl StatusHook {
    pub fn new(output_dir: &Path) -> Self {
        Self { path: output_dir.join("run_batch_team_exit_statuses.yaml"), statuses: Mutex::new(BTreeMap::new()) }
    }

    async fn set(&self, instance_id: &str, status: &str) -> Result<()> {
        let mut statuses = self.statuses.lock().await;
        statuses.insert(instance_id.to_string(), status.to_string());
        let text = serde_yaml::to_string(&*statuses)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[async_trait]
impl RunHook for StatusHook {
    async fn on_instance_start(&self, _index: usize, problem: &ProblemStatement) -> Result<()> {
        self.set(&problem.id, "running").await
    }

    async fn on_instance_completed(&self, result: &Value) -> Result<()> {
        let Some(instance_id) = result.get("instance_id").and_then(Value::as_str) else {
            return Ok(());
        };
        let status = result.get("exit_status").and_then(Value::as_str).unwrap_or("completed");
        self.set(instance_id, status).await
    }
}

/// Writes `<problem_id>/<problem_id>.pred` from the instance's result on
/// `on_instance_completed`. Decoupled from the batch-level `preds.json`
/// merge, which happens separately (`merge_predictions`).
pub struct PatchSaveHook {
    output_dir: PathBuf,
}

impl PatchSaveHook {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl RunHook for PatchSaveHook {
    async fn on_instance_completed(&self, result: &Value) -> Result<()> {
        let prediction: Prediction = serde_json::from_value(result.clone())
            .map_err(|e| Error::Internal(format!("malformed instance result for patch save: {e}")))?;
        predictions::save_prediction(&self.output_dir, &prediction.instance_id, &prediction)
    }
}

/// Per-instance evaluator verdict, the fields the original's
/// `swe_bench_evaluate.py` keys its category sets on. Since the actual
/// test-execution harness is out of scope (§1), `resolved` here reflects
/// whatever `EvaluatorBackend` decides rather than a real test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorReport {
    pub patch_is_none: bool,
    pub patch_exists: bool,
    pub patch_successfully_applied: bool,
    pub resolved: bool,
}

/// The evaluator's batch-submission boundary (§6.2): given a merged set
/// of predictions, return a per-instance report. The core never
/// implements the harness itself; `NullEvaluatorBackend` is the
/// reference stub that lets the evaluator hook and its category-set
/// bookkeeping be exercised without one.
#[async_trait]
pub trait EvaluatorBackend: Send + Sync {
    async fn submit(&self, predictions: &BTreeMap<String, Value>, run_id: &str) -> Result<BTreeMap<String, EvaluatorReport>>;
}

/// Classifies predictions locally instead of submitting them anywhere:
/// a patch is considered "applied" whenever it is present and
/// non-empty, and is never marked `resolved`, since resolving requires
/// the out-of-scope test harness. Good enough to drive `results.json`
/// and `summary.json` end-to-end in the absence of a real backend.
pub struct NullEvaluatorBackend;

#[async_trait]
impl EvaluatorBackend for NullEvaluatorBackend {
    async fn submit(&self, predictions: &BTreeMap<String, Value>, run_id: &str) -> Result<BTreeMap<String, EvaluatorReport>> {
        tracing::warn!(run_id, "no evaluator backend configured; classifying predictions locally without running tests");
        let mut reports = BTreeMap::new();
        for (instance_id, pred) in predictions {
            let patch = pred.get("model_patch").and_then(Value::as_str);
            let patch_is_none = patch.is_none();
            let patch_exists = patch.is_some_and(|p| !p.trim().is_empty());
            reports.insert(
                instance_id.clone(),
                EvaluatorReport { patch_is_none, patch_exists, patch_successfully_applied: patch_exists, resolved: false },
            );
        }
        Ok(reports)
    }
}

/// Submits merged predictions for evaluation at run end, and
/// periodically during the run when `continuous_submission_every > 0`
/// (§10 "Continuous submission"). `run_id` is namespaced by the output
/// directory name plus a construction-time timestamp so repeated runs
/// against the same directory never collide.
pub struct EvaluatorHook {
    backend: std::sync::Arc<dyn EvaluatorBackend>,
    output_dir: PathBuf,
    merge_lock: MergeLock,
    continuous_submission_every: Duration,
    last_evaluation: Mutex<Instant>,
    run_id: String,
}

impl EvaluatorHook {
    pub fn new(
        backend: std::sync::Arc<dyn EvaluatorBackend>,
        output_dir: PathBuf,
        merge_lock: MergeLock,
        continuous_submission_every_secs: u64,
    ) -> Self {
        let run_name = output_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "run".to_string());
        let run_id = format!("{run_name}_{}", chrono::Local::now().format("%Y%m%d%H%M%S%f"));
        Self {
            backend,
            output_dir,
            merge_lock,
            continuous_submission_every: Duration::from_secs(continuous_submission_every_secs),
            last_evaluation: Mutex::new(Instant::now()),
            run_id,
        }
    }

    async fn submit_and_write(&self, preds_path: &Path, write_results: bool) -> Result<()> {
        let text = std::fs::read_to_string(preds_path)?;
        let predictions: BTreeMap<String, Value> = serde_json::from_str(&text)?;
        let reports = self.backend.submit(&predictions, &self.run_id).await?;
        if write_results {
            write_results_and_summary(&self.output_dir, &reports)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunHook for EvaluatorHook {
    async fn on_instance_completed(&self, _result: &Value) -> Result<()> {
        if self.continuous_submission_every.is_zero() {
            return Ok(());
        }
        let mut last = self.last_evaluation.lock().await;
        if last.elapsed() < self.continuous_submission_every {
            return Ok(());
        }
        *last = Instant::now();
        drop(last);

        let tmp_path = self.output_dir.join("tmppreds.json");
        predictions::merge_predictions(&self.output_dir, &self.merge_lock).await?;
        std::fs::copy(self.output_dir.join("preds.json"), &tmp_path)?;

        let result = self.submit_and_write(&tmp_path, false).await;
        let _ = std::fs::remove_file(&tmp_path);
        result
    }

    async fn on_run_done(&self, _trajectory: &[StepOutput], _info: &Value) -> Result<()> {
        predictions::merge_predictions(&self.output_dir, &self.merge_lock).await?;
        let preds_path = self.output_dir.join("preds.json");
        if !preds_path.is_file() {
            tracing::error!(path = %preds_path.display(), "predictions file not found; skipping evaluation");
            return Ok(());
        }
        self.submit_and_write(&preds_path, true).await
    }
}

fn write_results_and_summary(output_dir: &Path, reports: &BTreeMap<String, EvaluatorReport>) -> Result<()> {
    std::fs::write(output_dir.join("results.json"), serde_json::to_string_pretty(reports)?)?;

    let mut submitted = BTreeSet::new();
    let mut completed = BTreeSet::new();
    let mut resolved = BTreeSet::new();
    let mut unresolved = BTreeSet::new();
    let mut empty_patch = BTreeSet::new();
    let mut error = BTreeSet::new();
    let unstopped: BTreeSet<String> = BTreeSet::new();

    for (instance_id, report) in reports {
        submitted.insert(instance_id.clone());
        if report.patch_is_none || !report.patch_exists {
            empty_patch.insert(instance_id.clone());
        } else if !report.patch_successfully_applied {
            error.insert(instance_id.clone());
        } else if report.resolved {
            resolved.insert(instance_id.clone());
            completed.insert(instance_id.clone());
        } else {
            unresolved.insert(instance_id.clone());
            completed.insert(instance_id.clone());
        }
    }

    let summary = serde_json::json!({
        "metrics": {
            "total_instances": reports.len(),
            "submitted_instances": submitted.len(),
            "completed_instances": completed.len(),
            "resolved_instances": resolved.len(),
            "unresolved_instances": unresolved.len(),
            "empty_patch_instances": empty_patch.len(),
            "error_instances": error.len(),
            "unstopped_instances": unstopped.len(),
        },
        "submitted_instances": submitted,
        "completed_instances": completed,
        "resolved_instances": resolved,
        "unresolved_instances": unresolved,
        "empty_patch_instances": empty_patch,
        "error_instances": error,
        "unstopped_instances": unstopped,
    });
    std::fs::write(output_dir.join("summary.json"), serde_json::to_string_pretty(&summary)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::Mutex as TokioMutex;

    #[tokio::test]
    async fn status_hook_writes_yaml_on_every_transition() {
        let dir = tempdir().unwrap();
        let hook = StatusHook::new(dir.path());
        let problem = ProblemStatement { id: "i1".into(), text: "x".into(), extra_fields: Default::default() };
        hook.on_instance_start(0, &problem).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join("run_batch_team_exit_statuses.yaml")).unwrap();
        assert!(text.contains("i1: running"));

        hook.on_instance_completed(&serde_json::json!({"instance_id": "i1", "exit_status": "submitted"})).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join("run_batch_team_exit_statuses.yaml")).unwrap();
        assert!(text.contains("i1: submitted"));
    }

    #[tokio::test]
    async fn patch_save_hook_writes_pred_file() {
        let dir = tempdir().unwrap();
        let hook = PatchSaveHook::new(dir.path().to_path_buf());
        let result = serde_json::json!({"instance_id": "i1", "model_patch": "diff --git a b", "model_name_or_path": "team"});
        hook.on_instance_completed(&result).await.unwrap();
        assert!(predictions::prediction_exists(dir.path(), "i1"));
    }

    #[tokio::test]
    async fn evaluator_hook_writes_results_and_summary_without_a_backend() {
        let dir = tempdir().unwrap();
        predictions::save_prediction(
            dir.path(),
            "i1",
            &Prediction { instance_id: "i1".into(), model_patch: Some("diff".into()), model_name_or_path: "team".into() },
        )
        .unwrap();
        let lock: MergeLock = Arc::new(TokioMutex::new(()));
        let hook = EvaluatorHook::new(Arc::new(NullEvaluatorBackend), dir.path().to_path_buf(), lock, 0);
        hook.on_run_done(&[], &Value::Null).await.unwrap();

        let summary_text = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let summary: Value = serde_json::from_str(&summary_text).unwrap();
        assert_eq!(summary["metrics"]["total_instances"], 1);
        assert_eq!(summary["metrics"]["completed_instances"], 1);
    }
}
