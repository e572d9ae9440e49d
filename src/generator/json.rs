use std::path::Path;

use crate::domain::TargetGroupList;
use crate::error::{Error, Result};

/// Parses a `.json` generator file as a target-group list.
///
/// Grounded on `sd.py`'s `run_json`. A `null` document or one that is
/// valid JSON but not a target-group-list shape is treated as a generator
/// failure, not an empty result — matching SPEC_FULL.md invariant 4.
pub fn run(path: &Path) -> Result<TargetGroupList> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    if value.is_null() {
        return Err(Error::GeneratorFailure(format!(
            "{} produced null",
            path.display()
        )));
    }
    let groups: TargetGroupList = serde_json::from_value(value).map_err(|e| {
        Error::GeneratorFailure(format!("{}: invalid target group list: {e}", path.display()))
    })?;
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, br#"[{"targets":["h:9100"],"labels":{"env":"prod"}}]"#).unwrap();
        let groups = run(&file).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].targets, vec!["h:9100".to_string()]);
    }

    #[test]
    fn null_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, b"null").unwrap();
        assert!(run(&file).is_err());
    }
}
