//! Canvas normalization: decode the upload and force it to exactly `1080*n x 1080`.

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use tracing::{debug, info};

use super::TILE_SIZE;
use crate::errors::{Error, Result};

/// Fill resize primitive.
///
/// Implementations stretch both axes independently to hit the target, ignoring the aspect ratio.
pub trait Resizer: Send + Sync {
    fn resize_fill(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;
}

/// [`Resizer`] backed by `image`'s exact resize.
#[derive(Debug, Clone, Copy)]
pub struct FillResizer {
    filter: FilterType,
}

impl FillResizer {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for FillResizer {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3)
    }
}

impl Resizer for FillResizer {
    fn resize_fill(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, self.filter)
    }
}

/// Canvas dimensions for `n` tiles.
pub fn expected_dimensions(n: u32) -> (u32, u32) {
    (TILE_SIZE * n, TILE_SIZE)
}

/// Refuse canvases larger than `max_pixels` before anything is decoded or allocated.
pub fn check_canvas_budget(n: u32, max_pixels: u64) -> Result<()> {
    let (width, height) = expected_dimensions(n);
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(Error::internal(format!(
            "allocate a {width}x{height} canvas ({pixels} pixels, limit {max_pixels})"
        )));
    }
    Ok(())
}

/// The working image, guaranteed to measure `1080*n x 1080`.
#[derive(Debug)]
pub struct Canvas {
    image: DynamicImage,
    resized: bool,
}

impl Canvas {
    /// Decode `bytes` and normalize the result for `n` tiles.
    pub fn normalize(bytes: &[u8], n: u32, resizer: &dyn Resizer) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Self::from_image(image, n, resizer)
    }

    pub fn from_image(image: DynamicImage, n: u32, resizer: &dyn Resizer) -> Result<Self> {
        let (expected_width, expected_height) = expected_dimensions(n);
        let (width, height) = image.dimensions();
        debug!(width, height, expected_width, expected_height, "Measured uploaded image");

        if (width, height) == (expected_width, expected_height) {
            return Ok(Self { image, resized: false });
        }

        let image = resizer.resize_fill(&image, expected_width, expected_height);
        let (actual_width, actual_height) = image.dimensions();
        info!(
            from_width = width,
            from_height = height,
            actual_width,
            actual_height,
            "Resized image to canvas"
        );

        if (actual_width, actual_height) != (expected_width, expected_height) {
            return Err(Error::ResizeFailure {
                expected_width,
                expected_height,
                actual_width,
                actual_height,
            });
        }

        crate::metrics::record_resize();
        Ok(Self { image, resized: true })
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn was_resized(&self) -> bool {
        self.resized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingResizer, ShortResizer, jpeg_fixture, png_fixture};

    #[test]
    fn test_canvas_budget() {
        let one_tile = 1080 * 1080;
        assert!(check_canvas_budget(1, one_tile).is_ok());
        assert!(check_canvas_budget(20, 20 * one_tile).is_ok());

        let err = check_canvas_budget(21, 20 * one_tile).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(check_canvas_budget(crate::pipeline::MAX_TILES, 20 * one_tile).is_err());
    }

    #[test]
    fn test_exact_canvas_is_passed_through() {
        let resizer = CountingResizer::default();
        let canvas = Canvas::normalize(&jpeg_fixture(2160, 1080), 2, &resizer).unwrap();

        assert_eq!((canvas.width(), canvas.height()), (2160, 1080));
        assert!(!canvas.was_resized());
        assert_eq!(resizer.calls(), 0);
    }

    #[test]
    fn test_arbitrary_input_is_stretched_to_canvas() {
        let resizer = CountingResizer::default();
        let canvas = Canvas::normalize(&jpeg_fixture(500, 500), 1, &resizer).unwrap();

        assert_eq!((canvas.width(), canvas.height()), (1080, 1080));
        assert!(canvas.was_resized());
        assert_eq!(resizer.calls(), 1);
    }

    #[test]
    fn test_aspect_ratio_is_ignored() {
        // A tall PNG still ends up three tiles wide
        let canvas = Canvas::normalize(&png_fixture(300, 900), 3, &FillResizer::new(FilterType::Nearest)).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (3240, 1080));
    }

    #[test]
    fn test_wrong_resize_output_is_rejected() {
        let err = Canvas::normalize(&jpeg_fixture(500, 500), 2, &ShortResizer).unwrap_err();

        match err {
            Error::ResizeFailure {
                expected_width,
                expected_height,
                actual_width,
                actual_height,
            } => {
                assert_eq!((expected_width, expected_height), (2160, 1080));
                assert_eq!((actual_width, actual_height), (2159, 1080));
            }
            other => panic!("expected ResizeFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_undecodable_bytes_are_internal_errors() {
        let err = Canvas::normalize(b"definitely not an image", 1, &FillResizer::default()).unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
