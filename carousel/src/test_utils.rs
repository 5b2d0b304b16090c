//! Fixtures and fakes shared by the unit tests.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage, imageops::FilterType};
use tempfile::NamedTempFile;

use crate::config::{Config, LocalStorageConfig, StorageConfig, UploadConfig};
use crate::errors::{Error, Result};
use crate::pipeline::CropPipeline;
use crate::pipeline::extract::{Tile, TileKey};
use crate::pipeline::normalize::{FillResizer, Resizer};
use crate::sink::TileSink;
use crate::upload::UploadRequest;
use crate::{AppState, build_router};

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).expect("Failed to encode fixture");
    buf.into_inner()
}

/// A JPEG with a horizontal gradient, so crops of different regions differ.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

/// A half-transparent RGBA PNG.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([20, 160, 90, 128]));
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// A PNG whose left half is red and right half is blue.
pub fn split_color_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

/// Write `bytes` to a temp file in `dir` and wrap it as a request for `n` tiles.
pub fn stage_upload(dir: &Path, bytes: &[u8], n: u32) -> UploadRequest {
    let mut file = NamedTempFile::new_in(dir).expect("Failed to create temp file");
    file.write_all(bytes).expect("Failed to write fixture");
    file.flush().expect("Failed to flush fixture");
    UploadRequest::from_staged(file, n).expect("Failed to stage upload")
}

/// [`FillResizer`] that counts how often it is asked to resize.
#[derive(Default)]
pub struct CountingResizer {
    inner: FillResizer,
    calls: AtomicUsize,
}

impl CountingResizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resizer for CountingResizer {
    fn resize_fill(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resize_fill(image, width, height)
    }
}

/// A resizer that always comes up one pixel short.
pub struct ShortResizer;

impl Resizer for ShortResizer {
    fn resize_fill(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width.saturating_sub(1).max(1), height, FilterType::Nearest)
    }
}

/// In-memory [`TileSink`] whose URLs are the bare file names.
#[derive(Default)]
pub struct MemorySink {
    tiles: Mutex<Vec<(TileKey, Tile)>>,
    fail_at: Option<u32>,
}

impl MemorySink {
    /// Reject the tile with this index, and keep everything stored before it.
    pub fn failing_at(index: u32) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub fn tiles(&self) -> Vec<(TileKey, Tile)> {
        self.tiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileSink for MemorySink {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn persist(&self, key: &TileKey, tile: &Tile) -> Result<String> {
        if self.fail_at == Some(key.index) {
            return Err(Error::internal(format!("store {}", key.file_name())));
        }
        self.tiles.lock().unwrap().push((*key, tile.clone()));
        Ok(key.file_name())
    }
}

/// Config that stages uploads in `temp_dir` and never touches the network.
pub fn create_test_config(temp_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig::Local(LocalStorageConfig {
            directory: temp_dir.join("unused-tiles"),
            url_prefix: "/imagens/cropped".to_string(),
        }),
        upload: UploadConfig {
            temp_dir: Some(temp_dir.to_path_buf()),
        },
        ..Default::default()
    }
}

/// App state wired to `sink`, and to `resizer` when given.
pub fn create_test_state(temp_dir: &Path, sink: Arc<dyn TileSink>, resizer: Option<Arc<dyn Resizer>>) -> AppState {
    let config = create_test_config(temp_dir);
    let resizer = resizer.unwrap_or_else(|| Arc::new(FillResizer::default()));
    let pipeline =
        CropPipeline::new(sink, resizer, config.image.jpeg_quality).with_max_canvas_pixels(config.limits.max_canvas_pixels);

    AppState::builder().config(config).pipeline(Arc::new(pipeline)).build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}
