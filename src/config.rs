use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Cache/queue backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Filesystem,
    Redis,
}

/// Runtime configuration for the monolith and split binaries.
///
/// Adapted from `CoreGems-Cline-Xray`'s `config.rs` (`AppConfig` +
/// `load_config` file-overlay pattern, via `directories`/`toml`): unlike
/// the teacher's desktop app, the primary source of configuration here is
/// the CLI (see `cli.rs`), with an optional `config.toml` overlay for
/// values operators want to pin per-deployment rather than repeat on
/// every invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub root_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub url_prefix: String,
    pub log_level: String,

    pub backend: Backend,
    pub cache_dir: PathBuf,
    pub redis_url: Option<String>,
    pub cache_expire_seconds: u64,

    pub refresh_interval_seconds: u64,
    pub max_workers: usize,

    pub worker_metrics_host: String,
    pub worker_metrics_port: u16,
}

impl AppConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| ([127, 0, 0, 1], self.port).into())
    }

    pub fn worker_metrics_addr(&self) -> SocketAddr {
        format!("{}:{}", self.worker_metrics_host, self.worker_metrics_port)
            .parse()
            .unwrap_or_else(|_| ([127, 0, 0, 1], self.worker_metrics_port).into())
    }
}

/// Optional on-disk overlay; any field present here overrides the CLI
/// default built into the `AppConfig` for the active subcommand (see
/// `main::run`, which builds one `AppConfig` per subcommand and then
/// calls `apply_to`).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigOverlay {
    pub cache_expire_seconds: Option<u64>,
    pub refresh_interval_seconds: Option<u64>,
    pub max_workers: Option<usize>,
    pub redis_url: Option<String>,
}

impl ConfigOverlay {
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(v) = self.cache_expire_seconds {
            config.cache_expire_seconds = v;
        }
        if let Some(v) = self.refresh_interval_seconds {
            config.refresh_interval_seconds = v;
        }
        if let Some(v) = self.max_workers {
            config.max_workers = v;
        }
        if let Some(v) = self.redis_url.clone() {
            config.redis_url = Some(v);
        }
    }
}

pub fn load_overlay(path: &std::path::Path) -> anyhow::Result<ConfigOverlay> {
    if !path.exists() {
        return Ok(ConfigOverlay::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// Directory used to persist a default config template the first time an
/// operator runs the tool without `--config`, mirroring the teacher's
/// `get_config_dir`/`load_config` create-if-missing behavior.
pub fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "httpsd", "prometheus-http-sd") {
        dirs.config_dir().join("config.toml")
    } else {
        PathBuf::from("config.toml")
    }
}
