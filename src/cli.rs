use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Grounded on `ats-checker`'s `Cli`/`Commands` derive shape; flag names
/// and defaults follow `cli.py` (`--host/-h`, `--port/-p`, `--url_prefix/-r`,
/// positional `root_dir`).
#[derive(Debug, Parser)]
#[command(name = "prometheus-http-sd", version, about = "HTTP service discovery with dispatched generation and caching")]
pub struct Cli {
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the monolith: HTTP server + in-process refresh dispatcher.
    Serve {
        root_dir: PathBuf,

        #[arg(long, short = 'H', default_value = "127.0.0.1")]
        host: String,

        #[arg(long, short = 'p', default_value_t = 8080)]
        port: u16,

        #[arg(long, short = 'r', default_value = "")]
        url_prefix: String,

        #[arg(long, default_value = "./cache")]
        cache_dir: PathBuf,

        #[arg(long, default_value_t = 300)]
        cache_expire_seconds: u64,

        #[arg(long, default_value_t = 5)]
        refresh_interval_seconds: u64,

        #[arg(long, default_value_t = 8)]
        max_workers: usize,
    },

    /// Run only the split-mode HTTP server (reads/writes a shared Redis
    /// cache + queue; no generator execution happens in this process).
    ServerOnly {
        root_dir: PathBuf,

        #[arg(long, short = 'H', default_value = "127.0.0.1")]
        host: String,

        #[arg(long, short = 'p', default_value_t = 8080)]
        port: u16,

        #[arg(long, short = 'r', default_value = "")]
        url_prefix: String,

        #[arg(long)]
        redis_url: String,

        #[arg(long, default_value_t = 300)]
        cache_expire_seconds: u64,
    },

    /// Run only split-mode workers pulling jobs off the shared queue.
    WorkerOnly {
        root_dir: PathBuf,

        #[arg(long)]
        redis_url: String,

        #[arg(long, default_value_t = 4)]
        worker_count: usize,

        #[arg(long, default_value_t = 300)]
        cache_expire_seconds: u64,

        #[arg(long, default_value = "127.0.0.1")]
        metrics_host: String,

        #[arg(long, default_value_t = 9090)]
        metrics_port: u16,
    },

    /// Validate every generator file under root_dir without serving.
    Check { root_dir: PathBuf },
}
