//! Tile extraction and the naming shared by every sink.

use bytes::Bytes;
use image::{DynamicImage, codecs::jpeg::JpegEncoder};

use super::TILE_SIZE;
use super::normalize::Canvas;
use crate::errors::Result;

/// One encoded 1080x1080 square cut from the canvas.
#[derive(Debug, Clone)]
pub struct Tile {
    pub index: u32,
    /// Horizontal offset of the tile within the canvas
    pub left: u32,
    /// JPEG-encoded pixels
    pub bytes: Bytes,
}

/// Name under which a tile is stored.
///
/// All tiles of one request share the timestamp, so they sort together and by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileKey {
    /// Unix time in milliseconds, taken once per request
    pub timestamp: i64,
    pub index: u32,
}

impl TileKey {
    pub fn file_name(&self) -> String {
        format!("cropped-{}-{}.jpg", self.timestamp, self.index)
    }
}

/// Where a persisted tile can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileReference {
    pub index: u32,
    pub url: String,
}

/// Whether tile `index` lies fully inside a canvas of `width` pixels.
pub fn fits(index: u32, width: u32) -> bool {
    u64::from(index) * u64::from(TILE_SIZE) + u64::from(TILE_SIZE) <= u64::from(width)
}

/// Cut tile `index` out of the canvas and encode it as JPEG.
pub fn extract_tile(canvas: &Canvas, index: u32, jpeg_quality: u8) -> Result<Tile> {
    let left = index * TILE_SIZE;
    let region = canvas.image().crop_imm(left, 0, TILE_SIZE, TILE_SIZE);
    Ok(Tile {
        index,
        left,
        bytes: encode_jpeg(&region, jpeg_quality)?,
    })
}

/// JPEG has no alpha channel, so everything is flattened to 8-bit RGB first.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Bytes> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    Ok(Bytes::from(buf))
}
