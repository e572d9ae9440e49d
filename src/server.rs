use crate::handlers::{admin_index_handler, scrape_configs_handler, targets_handler};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the axum router for the monolith and server-only binaries.
///
/// Grounded on `server.rs`'s `create_router` (route-group assembly, CORS
/// layered over the merged router, a tracing layer over everything) with
/// the Jira/Tauri route groups replaced by the service-discovery surface
/// from SPEC_FULL.md §6: `/targets`, `/scrape_configs`, `/`, `/metrics`.
pub fn build_router(
    state: Arc<AppState>,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prefix = state.url_prefix.clone();

    let target_routes = Router::new()
        .route("/targets", get(targets_handler))
        .route("/targets/*rest_path", get(targets_handler))
        .route("/scrape_configs/*rest_path", get(scrape_configs_handler))
        .route("/", get(admin_index_handler));

    let metrics_routes = Router::new().route(
        "/metrics",
        get(move || {
            let handle = metrics_handle.clone();
            async move { handle.render() }
        }),
    );

    let mut router = Router::new().merge(target_routes.clone()).merge(metrics_routes.clone());
    if !prefix.is_empty() && prefix != "/" {
        router = router
            .nest(&prefix, target_routes)
            .nest(&prefix, metrics_routes);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
