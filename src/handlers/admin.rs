use axum::extract::State;
use axum::response::Html;
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

use crate::state::AppState;

/// `/`: an HTML index of every directory reachable under root, including
/// nested ones — grounded on `app.py`'s admin route, which walks the
/// whole generator tree with `os.walk` (not just root's immediate
/// children) and excludes any path with an `_`-prefixed component.
pub async fn admin_index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(&state.root_dir)
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
    {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&state.root_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        paths.push(rel);
    }
    paths.sort();
    paths.dedup();

    let links: String = paths
        .iter()
        .map(|p| {
            format!(
                "<li><a href=\"{prefix}/targets/{p}\">/{p}</a></li>",
                prefix = state.url_prefix
            )
        })
        .collect();

    Html(format!(
        "<html><body><h1>prometheus-http-sd</h1><ul>{links}</ul></body></html>"
    ))
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('_') || s.starts_with('.'))
        .unwrap_or(false)
}
