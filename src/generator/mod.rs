mod json;
mod script;
mod yaml;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::domain::{TargetGroup, TargetGroupList};
use crate::error::{Error, Result};

/// Enumerates and runs generator files under a root directory.
///
/// Grounded on `sd.py`: `should_ignore`/`get_generator_list` (enumeration,
/// dotfile/underscore exclusion) and `run_generator` (extension dispatch +
/// per-file timing/counters).
pub struct GeneratorRegistry {
    root: PathBuf,
    test_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeneratorKind {
    Json,
    Yaml,
    Script,
}

impl GeneratorRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GeneratorRegistry {
            root: root.into(),
            test_mode: std::env::var("HTTPSD_TEST_MODE").as_deref() == Ok("1"),
        }
    }

    /// Enumerates every generator file reachable beneath `rest_path`
    /// (relative to root), skipping any path whose component starts with
    /// `_` or `.`.
    pub fn enumerate(&self, rest_path: &str) -> Result<Vec<PathBuf>> {
        let base = self.resolve_dir(rest_path)?;
        let mut out = Vec::new();
        for entry in WalkDir::new(&base).into_iter() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if should_ignore(rel) {
                continue;
            }
            out.push(entry.path().to_path_buf());
        }
        out.sort();
        Ok(out)
    }

    fn resolve_dir(&self, rest_path: &str) -> Result<PathBuf> {
        let candidate = self.root.join(rest_path.trim_start_matches('/'));
        if !candidate.exists() {
            return Err(Error::NotFound(rest_path.to_string()));
        }
        Ok(candidate)
    }

    /// Whether `rest_path` resolves to a real directory under root. Lets
    /// callers distinguish "nothing here" (404) from "not refreshed yet"
    /// (the dispatcher's cache-miss/expired errors) before they even touch
    /// the cache or dispatcher.
    pub fn exists(&self, rest_path: &str) -> bool {
        self.root.join(rest_path.trim_start_matches('/')).exists()
    }

    /// Runs every generator file found under `rest_path` and concatenates
    /// their target-group lists. A single failing generator fails the
    /// whole request — matching `run_generator`'s per-file exception
    /// propagation in the original, where one bad generator aborts the
    /// containing request rather than being silently skipped.
    pub async fn run(
        &self,
        rest_path: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<TargetGroupList> {
        let files = self.enumerate(rest_path)?;
        let mut all = Vec::new();
        for file in files {
            let groups = self.run_one(&file, args).await?;
            all.extend(groups);
        }
        Ok(all)
    }

    /// Runs exactly one generator file, used by `/scrape_configs/<p>`.
    pub async fn run_file(
        &self,
        rest_path: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<TargetGroupList> {
        let candidates = [
            self.root.join(format!("{rest_path}.json")),
            self.root.join(format!("{rest_path}.yaml")),
            self.root.join(format!("{rest_path}.yml")),
            self.root.join(rest_path),
        ];
        let file = candidates
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| Error::NotFound(rest_path.to_string()))?;
        self.run_one(&file, args).await
    }

    async fn run_one(
        &self,
        file: &Path,
        args: &BTreeMap<String, String>,
    ) -> Result<TargetGroupList> {
        let kind = classify(file)?;
        let start = Instant::now();
        let label_path = file.display().to_string();

        let result = match kind {
            GeneratorKind::Json => json::run(file),
            GeneratorKind::Yaml => yaml::run(file),
            GeneratorKind::Script => script::run(file, args, self.test_mode).await,
        };

        let elapsed = start.elapsed().as_secs_f64();
        let status = if result.is_ok() { "success" } else { "fail" };
        metrics::histogram!(crate::metrics::GENERATOR_RUN_DURATION_SECONDS, "path" => label_path.clone())
            .record(elapsed);
        metrics::counter!(crate::metrics::GENERATOR_REQUESTS_TOTAL, "path" => label_path.clone(), "status" => status)
            .increment(1);

        match &result {
            Ok(groups) => {
                metrics::gauge!(crate::metrics::GENERATOR_LAST_GENERATED_TARGETS, "path" => label_path)
                    .set(groups.len() as f64);
            }
            Err(_) => {}
        }

        result
    }

    /// Runs every generator file under root — including scripted ones,
    /// invoked the same way the dispatcher/worker paths invoke them, with
    /// `HTTPSD_TEST_MODE=1` honored so a script can short-circuit real
    /// network calls during `check` — and validates each produced target
    /// group. Grounded on `validate.py`'s `validate()`/`check_content`.
    pub async fn validate(&self) -> Result<usize> {
        let files = self.enumerate("")?;
        let empty_args = BTreeMap::new();
        let mut total = 0usize;
        for file in &files {
            let groups = self.run_one(file, &empty_args).await?;
            for group in &groups {
                check_content(group).map_err(|msg| {
                    Error::GeneratorFailure(format!("{}: {msg}", file.display()))
                })?;
            }
            total += groups.len();
        }
        Ok(total)
    }
}

/// Validates a generated target group's content: `targets` must be
/// nonempty and every entry must be a `host:port` pair; `labels` is
/// already constrained to string values by `TargetGroup`'s type, so no
/// separate "not a string"/"is a bool" check is needed here.
fn check_content(group: &TargetGroup) -> std::result::Result<(), String> {
    if group.targets.is_empty() {
        return Err("targets must not be empty".to_string());
    }
    for target in &group.targets {
        let has_port = target
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);
        if !has_port {
            return Err(format!("target {target:?} is not a host:port pair"));
        }
    }
    Ok(())
}

fn classify(path: &Path) -> Result<GeneratorKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(GeneratorKind::Json),
        Some("yaml") | Some("yml") => Ok(GeneratorKind::Yaml),
        Some(_) | None => Ok(GeneratorKind::Script),
    }
}

fn should_ignore(rel_path: &Path) -> bool {
    rel_path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| s.starts_with('_') || s.starts_with('.'))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_underscore_and_dot_prefixed_components() {
        assert!(should_ignore(Path::new("_private/x.json")));
        assert!(should_ignore(Path::new("a/.hidden/x.json")));
        assert!(!should_ignore(Path::new("a/b/x.json")));
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify(Path::new("a.json")).unwrap(), GeneratorKind::Json);
        assert_eq!(classify(Path::new("a.yaml")).unwrap(), GeneratorKind::Yaml);
        assert_eq!(classify(Path::new("a.yml")).unwrap(), GeneratorKind::Yaml);
        assert_eq!(classify(Path::new("a.sh")).unwrap(), GeneratorKind::Script);
    }

    #[test]
    fn check_content_rejects_empty_targets() {
        let group = TargetGroup {
            targets: vec![],
            labels: Default::default(),
        };
        assert!(check_content(&group).is_err());
    }

    #[test]
    fn check_content_rejects_target_without_port() {
        let group = TargetGroup {
            targets: vec!["192.168.19.5".to_string()],
            labels: Default::default(),
        };
        assert!(check_content(&group).is_err());
    }

    #[test]
    fn check_content_accepts_host_port_targets() {
        let group = TargetGroup {
            targets: vec!["192.168.19.2:9100".to_string()],
            labels: Default::default(),
        };
        assert!(check_content(&group).is_ok());
    }

    #[test]
    fn exists_distinguishes_real_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();

        let reg = GeneratorRegistry::new(dir.path());
        assert!(reg.exists("a"));
        assert!(!reg.exists("does-not-exist"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn validate_runs_scripted_generators() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("gen.sh");
        std::fs::write(
            &script_path,
            "#!/bin/sh\necho '[{\"targets\":[\"127.0.0.1:9100\"],\"labels\":{}}]'\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).unwrap();

        let reg = GeneratorRegistry::new(dir.path());
        let total = reg.validate().await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn enumerate_skips_hidden_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/_hidden")).unwrap();
        std::fs::write(dir.path().join("a/visible.json"), b"[]").unwrap();
        std::fs::write(dir.path().join("a/_hidden/x.json"), b"[]").unwrap();

        let reg = GeneratorRegistry::new(dir.path());
        let files = reg.enumerate("a").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.json"));
    }
}
