//! HTTP handler for the embedded front end.

use axum::{
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::static_assets::Assets;

/// Serve an embedded asset, `index.html` for `/`
#[instrument(skip_all, fields(path = %uri.path()))]
pub async fn serve_embedded_asset(uri: Uri) -> Response {
    let mut path = uri.path().trim_start_matches('/');
    if path.is_empty() {
        path = "index.html";
    }

    let Some(content) = Assets::get(path) else {
        debug!("No embedded asset for path");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        content.data.into_owned(),
    )
        .into_response()
}
