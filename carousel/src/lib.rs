//! # carousel: image slicing for Instagram carousels
//!
//! `carousel` is a small HTTP service that takes one wide image and cuts it into `n` square
//! 1080x1080 JPEG tiles which, posted side by side as a carousel, reassemble into the original
//! panorama.
//!
//! ## Request Flow
//!
//! A client posts a multipart form with a `file` and a tile count `n` to `/api/crop-image`. The
//! upload is streamed to a temporary file ([`upload`]), decoded and stretched to exactly
//! `1080*n x 1080` if it is not already that size ([`pipeline::normalize`]), and then cut into `n`
//! consecutive squares from left to right ([`pipeline::extract`]). Each tile is handed to the
//! configured [`sink::TileSink`], either a local directory that this server also serves or an S3
//! bucket, and the response lists one URL per tile in order:
//!
//! ```json
//! { "imagePaths": ["/imagens/cropped/cropped-1718000000000-0.jpg", "..."] }
//! ```
//!
//! Every failure is reported as `{ "error": "..." }` with a matching status code; see
//! [`errors::Error`]. The temporary upload is removed whether the request succeeds or not.
//!
//! ## Other Routes
//!
//! - `GET /healthz`: liveness
//! - `GET /api-docs/openapi.json` and `GET /docs`: API reference
//! - `GET /internal/metrics`: Prometheus metrics, when `enable_metrics` is set
//! - `GET /`: the embedded upload form, when `serve_frontend` is set
//!
//! ## Configuration
//!
//! See [`config`] for the YAML file and `CAROUSEL_` environment overrides.

pub mod api;
pub mod config;
pub mod errors;
mod metrics;
mod openapi;
pub mod pipeline;
pub mod sink;
mod static_assets;
pub mod telemetry;
pub mod upload;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use config::StorageConfig;
use pipeline::CropPipeline;
use tokio::net::TcpListener;
use tower_http::{
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::openapi::ApiDoc;

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<CropPipeline>,
}

/// Build the application router.
///
/// Routes that depend on configuration (tile serving, the upload form, metrics) are only mounted
/// when enabled.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let crop_route = post(api::handlers::crop::crop_image)
        .fallback(api::handlers::crop::method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.limits.max_upload_size));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api/crop-image", crop_route)
        .with_state(state.clone())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Tiles written to disk are served back under the prefix the sink puts in its URLs
    if let StorageConfig::Local(local) = &state.config.storage {
        debug!(
            directory = %local.directory.display(),
            url_prefix = %local.url_prefix,
            "Serving local tiles"
        );
        router = router.nest_service(local.url_prefix.trim_end_matches('/'), ServeDir::new(&local.directory));
    }

    if state.config.serve_frontend {
        router = router.fallback(api::handlers::static_assets::serve_embedded_asset);
    }

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with its tile sink and directories ready
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting carousel with configuration: {:#?}", config);

        let temp_dir = config.upload.temp_dir();
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("create upload directory {}", temp_dir.display()))?;

        if let StorageConfig::Local(local) = &config.storage {
            tokio::fs::create_dir_all(&local.directory)
                .await
                .with_context(|| format!("create tile directory {}", local.directory.display()))?;
        }

        let sink = sink::from_config(&config.storage).await?;
        let pipeline = CropPipeline::from_config(&config, sink);

        let state = AppState::builder().config(config.clone()).pipeline(Arc::new(pipeline)).build();
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Carousel listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{MemorySink, create_test_server, create_test_state, jpeg_fixture};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};

    #[tokio::test]
    async fn test_healthz() {
        let temp = tempfile::tempdir().unwrap();
        let server = create_test_server(create_test_state(temp.path(), Arc::new(MemorySink::default()), None));

        let response = server.get("/healthz").await;

        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let temp = tempfile::tempdir().unwrap();
        let server = create_test_server(create_test_state(temp.path(), Arc::new(MemorySink::default()), None));

        let response = server.get("/api-docs/openapi.json").await;

        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/api/crop-image"]["post"].is_object());

        server.get("/docs").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_frontend_can_be_disabled() {
        let temp = tempfile::tempdir().unwrap();
        let mut state = create_test_state(temp.path(), Arc::new(MemorySink::default()), None);
        state.config.serve_frontend = false;
        let server = create_test_server(state);

        server.get("/").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reports_tiles() {
        let temp = tempfile::tempdir().unwrap();
        let mut state = create_test_state(temp.path(), Arc::new(MemorySink::default()), None);
        state.config.enable_metrics = true;
        let server = create_test_server(state);

        let form = MultipartForm::new()
            .add_text("n", "2")
            .add_part("file", Part::bytes(jpeg_fixture(2160, 1080)).file_name("wide.jpg"));
        server.post("/api/crop-image").multipart(form).await.assert_status_ok();

        let response = server.get("/internal/metrics").await;
        response.assert_status_ok();
        assert!(response.text().contains("carousel_tiles_written_total"));
    }

    #[tokio::test]
    async fn test_metrics_disabled_by_default() {
        let temp = tempfile::tempdir().unwrap();
        let server = create_test_server(create_test_state(temp.path(), Arc::new(MemorySink::default()), None));

        // Falls through to the frontend handler, which only knows `/`
        server.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_application_creates_directories() {
        let temp = tempfile::tempdir().unwrap();
        let uploads = temp.path().join("staging");
        let tiles = temp.path().join("public").join("imagens").join("cropped");
        let config = Config {
            storage: StorageConfig::Local(config::LocalStorageConfig {
                directory: tiles.clone(),
                url_prefix: "/imagens/cropped".to_string(),
            }),
            upload: config::UploadConfig {
                temp_dir: Some(uploads.clone()),
            },
            ..Default::default()
        };

        Application::new(config).await.unwrap();

        assert!(uploads.is_dir());
        assert!(tiles.is_dir());
    }
}
