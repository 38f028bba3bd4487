// Static asset server for the capture client
use axum::{response::Redirect, routing::get, Router};
use tower_http::services::{ServeDir, ServeFile};

use crate::settings::StaticSettings;

pub const CAPTURE_PATH: &str = "/capture";

/// `/` redirects permanently to the capture page; the asset tree is mounted
/// under `url_path`, or as the fallback when that is the root.
pub fn router(settings: &StaticSettings) -> Router {
    let capture_page = ServeFile::new(settings.views_dir.join("capture.html"));
    let assets = ServeDir::new(&settings.dir);

    let router = Router::new()
        .route("/", get(|| async { Redirect::permanent(CAPTURE_PATH) }))
        .route_service(CAPTURE_PATH, capture_page);

    match mount_prefix(&settings.url_path) {
        Some(prefix) => router.nest_service(&prefix, assets),
        None => router.fallback_service(assets),
    }
}

/// Normalized nesting prefix, or `None` for the root.
fn mount_prefix(url_path: &str) -> Option<String> {
    let trimmed = url_path.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{}", trimmed))
    }
}
