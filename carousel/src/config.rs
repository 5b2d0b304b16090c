//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CAROUSEL_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CAROUSEL_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CAROUSEL_STORAGE__TYPE=s3` sets the `storage.type` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`
//! - **Storage**: `storage.type` (`local` or `s3`) and the settings of the chosen tile sink
//! - **Limits**: `limits.max_upload_size`, `limits.max_tiles`, `limits.max_canvas_pixels`
//! - **Image**: `image.resize_filter`, `image.jpeg_quality`
//! - **Upload**: `upload.temp_dir` - where incoming files are staged
//! - **Features**: `enable_metrics`, `enable_otel_export`, `serve_frontend`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! CAROUSEL_PORT=8080
//! CAROUSEL_STORAGE__TYPE=s3
//! CAROUSEL_STORAGE__BUCKET=carousel-tiles
//! CAROUSEL_IMAGE__JPEG_QUALITY=90
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::errors::Error;
use crate::pipeline::{DEFAULT_MAX_CANVAS_PIXELS, TILE_SIZE};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CAROUSEL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where cropped tiles are persisted
    pub storage: StorageConfig,
    /// Request size limits
    pub limits: LimitsConfig,
    /// Resize and encoding settings
    pub image: ImageConfig,
    /// Staging of incoming uploads
    pub upload: UploadConfig,
    /// Serve the embedded upload form at `/`
    pub serve_frontend: bool,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            image: ImageConfig::default(),
            upload: UploadConfig::default(),
            serve_frontend: true,
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

/// Tile sink selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Write tiles under a directory that this server also serves
    Local(LocalStorageConfig),
    /// Upload tiles to an S3-compatible bucket
    S3(S3StorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local(LocalStorageConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalStorageConfig {
    /// Output directory, created recursively on first write
    pub directory: PathBuf,
    /// Root-relative URL path under which `directory` is served
    pub url_prefix: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("public/imagens/cropped"),
            url_prefix: "/imagens/cropped".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3StorageConfig {
    pub bucket: String,
    /// Falls back to the AWS default provider chain (AWS_REGION etc.) when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<Url>,
    pub force_path_style: bool,
    /// Prepended verbatim to every object key
    pub key_prefix: String,
    /// Base URL the returned tile URLs are built from (e.g. a CDN in front of the bucket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<Url>,
    /// Upload with the `public-read` canned ACL
    pub public_read: bool,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
            key_prefix: String::new(),
            public_base_url: None,
            public_read: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes for the crop endpoint
    pub max_upload_size: usize,
    /// Largest accepted `n` (0 = unlimited)
    pub max_tiles: u32,
    /// Largest canvas, in pixels, the pipeline will allocate; requests above it fail with 500
    pub max_canvas_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            max_tiles: 0,
            max_canvas_pixels: DEFAULT_MAX_CANVAS_PIXELS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Sampling filter for the fill resize
    pub resize_filter: ResizeFilter,
    /// JPEG quality of the emitted tiles (1-100)
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            resize_filter: ResizeFilter::Lanczos3,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Directory for staged uploads (system temp dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl UploadConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(Error::internal(format!(
                "Config validation: jpeg_quality must be between 1 and 100 (got {})",
                self.image.jpeg_quality
            )));
        }

        if self.limits.max_upload_size == 0 {
            return Err(Error::internal("Config validation: max_upload_size cannot be 0"));
        }

        if self.limits.max_canvas_pixels < u64::from(TILE_SIZE) * u64::from(TILE_SIZE) {
            return Err(Error::internal(format!(
                "Config validation: max_canvas_pixels must allow at least one {TILE_SIZE}x{TILE_SIZE} tile (got {})",
                self.limits.max_canvas_pixels
            )));
        }

        match &self.storage {
            StorageConfig::Local(local) => {
                if !local.url_prefix.starts_with('/') {
                    return Err(Error::internal(format!(
                        "Config validation: storage.url_prefix must be a root-relative path starting with '/' (got {:?})",
                        local.url_prefix
                    )));
                }
                if local.url_prefix.trim_end_matches('/').is_empty() {
                    return Err(Error::internal("Config validation: storage.url_prefix cannot be '/'"));
                }
            }
            StorageConfig::S3(s3) => {
                if s3.bucket.trim().is_empty() {
                    return Err(Error::internal(
                        "Config validation: storage.bucket is required when storage.type is s3. \
                         Set CAROUSEL_STORAGE__BUCKET or add bucket to the config file.",
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // CAROUSEL_CONFIG names the file itself and is not a config key
            .merge(Env::prefixed("CAROUSEL_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
