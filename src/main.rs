mod cache;
mod cli;
mod config;
mod dispatcher;
mod domain;
mod error;
mod fingerprint;
mod generator;
mod handlers;
mod logging;
mod metrics;
mod queue;
mod server;
mod single_flight;
mod state;
mod validate;
mod worker;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use cache::{Cache, FsCache, RedisCache};
use cli::{Cli, Commands};
use config::{AppConfig, Backend};
use dispatcher::Dispatcher;
use generator::GeneratorRegistry;
use queue::{JobQueue, RedisJobQueue};
use state::{AppState, MonolithDispatcher, SplitDispatcher};

/// Entry point and subcommand dispatch.
///
/// Grounded on `ats-checker`'s `src/bin/main.rs` (`#[tokio::main]`,
/// match-on-subcommand returning an exit code) rather than
/// `CoreGems-Cline-Xray`'s `main.rs`, whose manual-runtime-in-a-thread
/// pattern exists only to keep a Tauri desktop app's UI thread free — this
/// crate is a real server process, so a direct async `main` is the right
/// idiom. Exit codes follow SPEC_FULL.md §6: 0 success, 1 fatal startup
/// error, 2 a required backend was unavailable.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let overlay = config::load_overlay(&config_path)?;

    match cli.command {
        Commands::Serve {
            root_dir,
            host,
            port,
            url_prefix,
            cache_dir,
            cache_expire_seconds,
            refresh_interval_seconds,
            max_workers,
        } => {
            let mut config = AppConfig {
                root_dir: root_dir.clone(),
                host,
                port,
                url_prefix: url_prefix.clone(),
                log_level: cli.log_level.clone(),
                backend: Backend::Filesystem,
                cache_dir,
                redis_url: None,
                cache_expire_seconds,
                refresh_interval_seconds,
                max_workers,
                worker_metrics_host: "127.0.0.1".to_string(),
                worker_metrics_port: 9090,
            };
            overlay.apply_to(&mut config);

            let cache: Arc<dyn Cache> = Arc::new(FsCache::new(config.cache_dir.clone())?);
            let generators = Arc::new(GeneratorRegistry::new(config.root_dir.clone()));
            let dispatcher = Arc::new(Dispatcher::new(
                cache,
                generators.clone(),
                Duration::from_secs(config.refresh_interval_seconds),
                config.max_workers,
                config.cache_expire_seconds,
            ));
            dispatcher.clone().spawn_supervised();

            let metrics_handle = metrics::install_for_router()?;
            let state = Arc::new(AppState {
                dispatcher: Arc::new(MonolithDispatcher { dispatcher }),
                root_dir: config.root_dir.clone(),
                generators,
                url_prefix,
                start_time: Instant::now(),
            });

            serve_http(state, metrics_handle, config.bind_addr()).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::ServerOnly {
            root_dir,
            host,
            port,
            url_prefix,
            redis_url,
            cache_expire_seconds,
        } => {
            let mut config = AppConfig {
                root_dir: root_dir.clone(),
                host,
                port,
                url_prefix: url_prefix.clone(),
                log_level: cli.log_level.clone(),
                backend: Backend::Redis,
                cache_dir: std::path::PathBuf::from("./cache"),
                redis_url: Some(redis_url),
                cache_expire_seconds,
                refresh_interval_seconds: 0,
                max_workers: 0,
                worker_metrics_host: "127.0.0.1".to_string(),
                worker_metrics_port: 9090,
            };
            overlay.apply_to(&mut config);
            let redis_url = config
                .redis_url
                .clone()
                .expect("redis_url is always set for server-only");

            let cache: Arc<dyn Cache> = match RedisCache::new(&redis_url) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    error!(error = %e, "redis backend unavailable");
                    return Ok(ExitCode::from(2));
                }
            };
            let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(&redis_url)?);
            let generators = Arc::new(GeneratorRegistry::new(config.root_dir.clone()));

            let metrics_handle = metrics::install_for_router()?;
            let state = Arc::new(AppState {
                dispatcher: Arc::new(SplitDispatcher {
                    cache,
                    queue,
                    cache_ttl_seconds: config.cache_expire_seconds,
                }),
                root_dir: config.root_dir.clone(),
                generators,
                url_prefix,
                start_time: Instant::now(),
            });

            serve_http(state, metrics_handle, config.bind_addr()).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::WorkerOnly {
            root_dir,
            redis_url,
            worker_count,
            cache_expire_seconds,
            metrics_host,
            metrics_port,
        } => {
            let mut config = AppConfig {
                root_dir: root_dir.clone(),
                host: "127.0.0.1".to_string(),
                port: 0,
                url_prefix: String::new(),
                log_level: cli.log_level.clone(),
                backend: Backend::Redis,
                cache_dir: std::path::PathBuf::from("./cache"),
                redis_url: Some(redis_url),
                cache_expire_seconds,
                refresh_interval_seconds: 0,
                max_workers: worker_count,
                worker_metrics_host: metrics_host,
                worker_metrics_port: metrics_port,
            };
            overlay.apply_to(&mut config);
            let redis_url = config
                .redis_url
                .clone()
                .expect("redis_url is always set for worker-only");

            let cache: Arc<dyn Cache> = match RedisCache::new(&redis_url) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    error!(error = %e, "redis backend unavailable");
                    return Ok(ExitCode::from(2));
                }
            };
            let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(&redis_url)?);
            let generators = Arc::new(GeneratorRegistry::new(config.root_dir.clone()));

            let metrics_addr = config.worker_metrics_addr();
            tokio::spawn(async move {
                if let Err(e) = metrics::serve_standalone(metrics_addr).await {
                    error!(error = %e, "worker metrics listener failed");
                }
            });

            let pool = Arc::new(worker::WorkerPool::new(
                config.max_workers,
                queue,
                cache,
                generators,
                config.cache_expire_seconds,
            ));
            info!(worker_count = config.max_workers, "starting worker pool");
            pool.run().await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { root_dir } => match validate::validate(&root_dir).await {
            Ok(total) => {
                info!(total, "check passed");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!(error = %e, "check failed");
                Ok(ExitCode::from(1))
            }
        },
    }
}

async fn serve_http(
    state: Arc<AppState>,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    addr: std::net::SocketAddr,
) -> anyhow::Result<()> {
    let router = server::build_router(state, metrics_handle);
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
