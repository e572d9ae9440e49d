use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Error;
use crate::fingerprint;
use crate::state::AppState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_expire_seconds: Option<u64>,
}

#[derive(Serialize)]
struct ReloadBody {
    status: &'static str,
    message: String,
    path: String,
}

/// Thin HTTP adapter over `TargetDispatcher` (C7 RequestHandler).
///
/// Grounded on `redis/server.py`'s `/targets[/<rest_path>]` route: the
/// `reload`/`debug` control-key handling, the `l1_dir`/`l2_dir` metric
/// labels, and the `{"error": "cache miss"}` / `{"error": "cache
/// expired", ...}` response bodies are all taken from there; `app.py`
/// supplies the monolith debug-mode shape.
pub async fn targets_handler(
    State(state): State<Arc<AppState>>,
    path: Option<Path<String>>,
    Query(raw_args): Query<BTreeMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let rest_path = path.map(|Path(p)| p).unwrap_or_default();
    let full_path = format!("/targets/{rest_path}");
    let (l1_dir, l2_dir) = split_dirs(&rest_path);

    let start = Instant::now();
    let debug = fingerprint::is_true(&raw_args, "debug");
    let reload = fingerprint::is_true(&raw_args, "reload");
    let args = fingerprint::strip_control_keys(&raw_args);
    let fp = fingerprint::compute(&full_path, &raw_args);

    let response = if !state.generators.exists(&rest_path) {
        (
            "not-found",
            StatusCode::NOT_FOUND,
            error_body(&Error::NotFound(rest_path.clone()).to_string(), None, None),
        )
    } else if reload {
        handle_reload(&state, &rest_path, &fp, &args).await
    } else if debug {
        handle_debug(&state, &rest_path, &fp, &args).await
    } else {
        handle_scrape(&state, &rest_path, &fp, &args).await
    };

    let elapsed = start.elapsed().as_secs_f64();
    metrics::histogram!(
        crate::metrics::TARGET_PATH_REQUEST_DURATION_SECONDS,
        "l1_dir" => l1_dir.clone(),
        "l2_dir" => l2_dir.clone()
    )
    .record(elapsed);
    metrics::counter!(
        crate::metrics::TARGET_PATH_REQUESTS_TOTAL,
        "l1_dir" => l1_dir,
        "l2_dir" => l2_dir,
        "status" => response.0
    )
    .increment(1);

    (response.1, Json(response.2))
}

async fn handle_scrape(
    state: &AppState,
    rest_path: &str,
    fp: &str,
    args: &BTreeMap<String, String>,
) -> (&'static str, StatusCode, serde_json::Value) {
    match state.dispatcher.get_targets(rest_path, fp, args).await {
        Ok(entry) => {
            metrics::gauge!(
                crate::metrics::PATH_LAST_GENERATED_TARGETS,
                "path" => rest_path.to_string()
            )
            .set(entry.results.len() as f64);
            (
                "success",
                StatusCode::OK,
                serde_json::to_value(entry.results).unwrap_or(serde_json::Value::Array(vec![])),
            )
        }
        Err(Error::CacheNotExist) => (
            "cache-not-exist",
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body("cache miss", None, None),
        ),
        Err(Error::CacheExpired {
            updated_timestamp,
            cache_expire_seconds,
        }) => (
            "cache-expired",
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(
                "cache expired, you should try again later",
                Some(updated_timestamp),
                Some(cache_expire_seconds),
            ),
        ),
        Err(e @ Error::NotFound(_)) => (
            "not-found",
            StatusCode::NOT_FOUND,
            error_body(&e.to_string(), None, None),
        ),
        Err(e) => (
            "fail",
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(&e.to_string(), None, None),
        ),
    }
}

async fn handle_debug(
    state: &AppState,
    rest_path: &str,
    fp: &str,
    args: &BTreeMap<String, String>,
) -> (&'static str, StatusCode, serde_json::Value) {
    let info = state.dispatcher.debug_info(rest_path, fp, args).await;
    (
        "debug",
        StatusCode::OK,
        serde_json::to_value(info).unwrap_or(serde_json::Value::Null),
    )
}

async fn handle_reload(
    state: &AppState,
    rest_path: &str,
    fp: &str,
    args: &BTreeMap<String, String>,
) -> (&'static str, StatusCode, serde_json::Value) {
    match state.dispatcher.hard_reload(rest_path, fp, args).await {
        Ok(()) => (
            "reload",
            StatusCode::OK,
            serde_json::to_value(ReloadBody {
                status: "reload_initiated",
                message: "cache cleared and refresh enqueued".to_string(),
                path: rest_path.to_string(),
            })
            .unwrap(),
        ),
        Err(e) => (
            "fail",
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body(&e.to_string(), None, None),
        ),
    }
}

fn error_body(
    message: &str,
    updated_timestamp: Option<f64>,
    cache_expire_seconds: Option<u64>,
) -> serde_json::Value {
    let updated_time = updated_timestamp.map(|t| {
        Utc.timestamp_opt(t as i64, 0)
            .single()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    });
    serde_json::to_value(ErrorBody {
        error: message.to_string(),
        updated_timestamp,
        updated_time,
        cache_expire_seconds,
    })
    .unwrap()
}

fn split_dirs(rest_path: &str) -> (String, String) {
    let mut parts = rest_path.trim_start_matches('/').splitn(2, '/');
    let l1 = parts.next().unwrap_or("").to_string();
    let l2 = parts.next().unwrap_or("").to_string();
    (l1, l2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_first_two_path_segments() {
        assert_eq!(split_dirs("a/b/c.json"), ("a".to_string(), "b".to_string()));
        assert_eq!(split_dirs("a"), ("a".to_string(), "".to_string()));
        assert_eq!(split_dirs(""), ("".to_string(), "".to_string()));
    }
}
