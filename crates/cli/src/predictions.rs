//! Per-instance prediction files and the mutex-guarded merge routine
//! that folds them into `preds.json` (§6.3, §10 "Predictions merge
//! routine"). Merging recomputes the merged document from whatever
//! `.pred` files exist on disk, so repeated calls are commutative and
//! idempotent over instance IDs (§8 property 9) — there is no
//! in-memory accumulator to diverge from disk state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use teamcore_foundation::Result;

/// One instance's prediction as written to `<problem_id>.pred` and
/// folded into `preds.json`. `extra` carries whatever additional keys
/// an evaluator expects (e.g. `model_name_or_path`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Prediction {
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_patch: Option<String>,
    pub model_name_or_path: String,
}

pub fn save_prediction(output_dir: &Path, problem_id: &str, prediction: &Prediction) -> Result<()> {
    let instance_dir = output_dir.join(problem_id);
    std::fs::create_dir_all(&instance_dir)?;
    let path = instance_dir.join(format!("{problem_id}.pred"));
    std::fs::write(path, serde_json::to_string_pretty(prediction)?)?;
    Ok(())
}

pub fn prediction_exists(output_dir: &Path, problem_id: &str) -> bool {
    output_dir.join(problem_id).join(format!("{problem_id}.pred")).is_file()
}

/// Guards concurrent merges across worker tasks; shared, never cloned
/// per-worker (a fresh mutex per call would defeat the point).
pub type MergeLock = Arc<Mutex<()>>;

/// Scans `<output_dir>/*/*.pred`, folds them into a single map keyed by
/// instance ID (last writer for a given ID wins, but since each ID has
/// exactly one `.pred` file this is really "every known ID"), and
/// writes `preds.json`.
pub async fn merge_predictions(output_dir: &Path, lock: &MergeLock) -> Result<()> {
    let _guard = lock.lock().await;
    let merged = collect_predictions(output_dir)?;
    let dest = output_dir.join("preds.json");
    std::fs::write(dest, serde_json::to_string_pretty(&merged)?)?;
    Ok(())
}

fn collect_predictions(output_dir: &Path) -> Result<BTreeMap<String, Value>> {
    let mut merged = BTreeMap::new();
    if !output_dir.is_dir() {
        return Ok(merged);
    }
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let problem_id = entry.file_name().to_string_lossy().to_string();
        let pred_path = entry.path().join(format!("{problem_id}.pred"));
        if !pred_path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&pred_path)?;
        let value: Value = serde_json::from_str(&text)?;
        merged.insert(problem_id, value);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn merge_is_idempotent_and_commutative() {
        let dir = tempdir().unwrap();
        save_prediction(
            dir.path(),
            "i1",
            &Prediction { instance_id: "i1".to_string(), model_patch: Some("diff".to_string()), model_name_or_path: "team".to_string() },
        )
        .unwrap();
        let lock: MergeLock = Arc::new(Mutex::new(()));

        merge_predictions(dir.path(), &lock).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join("preds.json")).unwrap();
        merge_predictions(dir.path(), &lock).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join("preds.json")).unwrap();
        assert_eq!(first, second);

        let merged: BTreeMap<String, Value> = serde_json::from_str(&second).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged.contains_key("i1"));
    }

    #[test]
    fn prediction_exists_reflects_disk_state() {
        let dir = tempdir().unwrap();
        assert!(!prediction_exists(dir.path(), "i1"));
        save_prediction(
            dir.path(),
            "i1",
            &Prediction { instance_id: "i1".to_string(), model_patch: None, model_name_or_path: "team".to_string() },
        )
        .unwrap();
        assert!(prediction_exists(dir.path(), "i1"));
    }
}
