//! Tile persistence.
//!
//! A [`TileSink`] turns one encoded tile into something a browser can fetch. The pipeline calls it
//! once per tile, sequentially, in index order.
//!
//! - [`local::LocalDiskSink`]: writes into a directory served by this process, returns a
//!   root-relative path
//! - [`s3::S3Sink`]: uploads to an S3-compatible bucket, returns an absolute URL

pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::errors::Result;
use crate::pipeline::extract::{Tile, TileKey};

#[async_trait]
pub trait TileSink: Send + Sync {
    /// Short label used in logs and metrics
    fn kind(&self) -> &'static str;

    /// Store `tile` under `key` and return its public path or URL.
    async fn persist(&self, key: &TileKey, tile: &Tile) -> Result<String>;
}

/// Build the sink selected by `storage.type`.
pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Arc<dyn TileSink>> {
    let sink: Arc<dyn TileSink> = match config {
        StorageConfig::Local(local) => Arc::new(local::LocalDiskSink::new(local.directory.clone(), &local.url_prefix)),
        StorageConfig::S3(s3) => Arc::new(s3::S3Sink::from_config(s3).await?),
    };
    tracing::info!(sink = sink.kind(), "Tile sink configured");
    Ok(sink)
}
