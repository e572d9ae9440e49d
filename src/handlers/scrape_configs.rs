use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::state::AppState;

/// `/scrape_configs/<rest_path>`: runs a single generator file directly,
/// with no caching and no dispatcher involvement — grounded on `app.py`'s
/// `/scrape_configs/<rest_path>` route, which exists precisely to let an
/// operator sanity-check one generator's raw output.
pub async fn scrape_configs_handler(
    State(state): State<Arc<AppState>>,
    Path(rest_path): Path<String>,
    Query(args): Query<BTreeMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.generators.run_file(&rest_path, &args).await {
        Ok(groups) => (
            StatusCode::OK,
            Json(serde_json::to_value(groups).unwrap_or(serde_json::Value::Array(vec![]))),
        ),
        Err(e @ Error::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
