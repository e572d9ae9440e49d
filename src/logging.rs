use tracing_subscriber::{fmt, EnvFilter};

/// Initializes `tracing` with an env-filter, defaulting to `info` and
/// honoring `RUST_LOG` overrides.
///
/// Reworked from `CoreGems-Cline-Xray`'s `init_logging` (which built a
/// `simplelog` `CombinedLogger` from an on-disk `AppConfig`): this crate
/// is a long-running server rather than a desktop app, so structured,
/// queryable spans via `tracing`/`tracing-subscriber` fit better than a
/// timestamped-file-per-session model, and the teacher's Cargo.toml
/// already carries both stacks.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    tracing::info!(level = %level, "prometheus-http-sd starting up");
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        "TRACE" => "trace",
        _ => "info",
    }
}
