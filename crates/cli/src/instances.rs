//! Instance source loading. The core treats `instances` as an opaque
//! spec (§1 non-goals exclude dataset scraping); this binary supports
//! exactly one concrete source — a JSON array of `BatchInstance` — since
//! the HuggingFace/SWE-bench dataset loaders the original draws on are
//! out of scope for the core.

use std::path::Path;

use teamcore_foundation::{BatchInstance, Error, Result};

pub fn load_instances(path: &Path) -> Result<Vec<BatchInstance>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("failed to read instances file {}: {e}", path.display()))
    })?;
    let instances: Vec<BatchInstance> = serde_json::from_str(&text)
        .map_err(|e| Error::Configuration(format!("invalid instances file {}: {e}", path.display())))?;
    if instances.is_empty() {
        return Err(Error::Configuration(
            "no instances to run; check that the instances file is non-empty".to_string(),
        ));
    }
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_empty_instance_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        let err = load_instances(file.path()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn loads_a_well_formed_instance_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"problem":{{"id":"i1","text":"fix it","extra_fields":{{}}}},"sandbox":{{"image":"python:3.11"}}}}]"#
        )
        .unwrap();
        let instances = load_instances(file.path()).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].problem.id, "i1");
    }
}
