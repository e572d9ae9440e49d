use std::path::Path;

use crate::domain::TargetGroupList;
use crate::error::{Error, Result};

/// Parses a `.yaml`/`.yml` generator file, mirroring `sd.py`'s
/// `run_yaml`.
pub fn run(path: &Path) -> Result<TargetGroupList> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    if value.is_null() {
        return Err(Error::GeneratorFailure(format!(
            "{} produced null",
            path.display()
        )));
    }
    let groups: TargetGroupList = serde_yaml::from_value(value).map_err(|e| {
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
        let file = dir.path().join("a.yaml");
        std::fs::write(
            &file,
            "- targets:\n    - h:9100\n  labels:\n    env: prod\n",
        )
        .unwrap();
        let groups = run(&file).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].labels.get("env").unwrap(), "prod");
    }
}
