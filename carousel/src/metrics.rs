//! Pipeline metrics, exported alongside the HTTP metrics of `axum-prometheus`.
//!
//! Recording goes through the `metrics` facade and is a no-op until a recorder is installed,
//! which only happens when `enable_metrics` is set.

use std::time::Duration;

pub const TILES_WRITTEN: &str = "carousel_tiles_written_total";
pub const RESIZES: &str = "carousel_resizes_total";
pub const CROP_DURATION: &str = "carousel_crop_duration_seconds";

pub fn record_tile_written(sink: &'static str) {
    metrics::counter!(TILES_WRITTEN, "sink" => sink).increment(1);
}

pub fn record_resize() {
    metrics::counter!(RESIZES).increment(1);
}

pub fn record_crop_duration(elapsed: Duration) {
    metrics::histogram!(CROP_DURATION).record(elapsed.as_secs_f64());
}
