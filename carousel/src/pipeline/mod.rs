//! The crop pipeline: decode → normalize → extract → persist.
//!
//! Every stage runs to completion before the next begins, and tiles are extracted and handed to
//! the [`TileSink`] one at a time in ascending index order. CPU-bound work (decode, resize, crop,
//! JPEG encode) runs on the blocking pool so the request task only awaits it.

pub mod extract;
pub mod normalize;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::sink::TileSink;
use crate::upload::UploadRequest;
use extract::{TileKey, TileReference, extract_tile, fits};
use normalize::{Canvas, FillResizer, Resizer, check_canvas_budget};

/// Side length of every tile, in pixels.
pub const TILE_SIZE: u32 = 1080;

/// Largest `n` whose canvas width still fits in a `u32`.
pub const MAX_TILES: u32 = u32::MAX / TILE_SIZE;

/// Default canvas budget: twenty tiles.
pub const DEFAULT_MAX_CANVAS_PIXELS: u64 = 20 * TILE_SIZE as u64 * TILE_SIZE as u64;

pub struct CropPipeline {
    resizer: Arc<dyn Resizer>,
    sink: Arc<dyn TileSink>,
    jpeg_quality: u8,
    max_canvas_pixels: u64,
}

impl CropPipeline {
    pub fn new(sink: Arc<dyn TileSink>, resizer: Arc<dyn Resizer>, jpeg_quality: u8) -> Self {
        Self {
            resizer,
            sink,
            jpeg_quality,
            max_canvas_pixels: DEFAULT_MAX_CANVAS_PIXELS,
        }
    }

    pub fn with_max_canvas_pixels(mut self, max_canvas_pixels: u64) -> Self {
        self.max_canvas_pixels = max_canvas_pixels;
        self
    }

    pub fn from_config(config: &Config, sink: Arc<dyn TileSink>) -> Self {
        let resizer = FillResizer::new(config.image.resize_filter.into());
        Self::new(sink, Arc::new(resizer), config.image.jpeg_quality).with_max_canvas_pixels(config.limits.max_canvas_pixels)
    }

    /// Slice the staged upload into `upload.n` tiles and persist them.
    ///
    /// Returns one reference per stored tile, ordered by index.
    #[instrument(skip_all, fields(n = upload.n, upload_bytes = upload.size, sink = self.sink.kind()))]
    pub async fn run(&self, upload: &UploadRequest) -> Result<Vec<TileReference>> {
        let started = Instant::now();
        let n = upload.n;
        check_canvas_budget(n, self.max_canvas_pixels)?;

        let bytes = upload.read().await?;

        let resizer = self.resizer.clone();
        let canvas = run_blocking("normalize canvas", move || Canvas::normalize(&bytes, n, resizer.as_ref())).await?;
        let canvas = Arc::new(canvas);
        info!(
            width = canvas.width(),
            height = canvas.height(),
            resized = canvas.was_resized(),
            "Canvas ready"
        );

        let timestamp = Utc::now().timestamp_millis();
        let mut references = Vec::with_capacity(n as usize);

        for index in 0..n {
            if !fits(index, canvas.width()) {
                warn!(index, width = canvas.width(), "Tile extends past the canvas, stopping extraction");
                break;
            }

            let tile = {
                let canvas = canvas.clone();
                let quality = self.jpeg_quality;
                run_blocking("extract tile", move || extract_tile(&canvas, index, quality)).await?
            };

            let key = TileKey { timestamp, index };
            let url = self.sink.persist(&key, &tile).await?;
            crate::metrics::record_tile_written(self.sink.kind());
            info!(index, left = tile.left, url = %url, "Tile stored");

            references.push(TileReference { index, url });
        }

        crate::metrics::record_crop_duration(started.elapsed());
        Ok(references)
    }
}

async fn run_blocking<T, F>(operation: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("{operation}: worker task failed: {e}")))?
}
