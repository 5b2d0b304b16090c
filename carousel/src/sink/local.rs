use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::TileSink;
use crate::errors::{Error, Result};
use crate::pipeline::extract::{Tile, TileKey};

/// Writes tiles into a directory that the router serves under `url_prefix`.
#[derive(Debug, Clone)]
pub struct LocalDiskSink {
    directory: PathBuf,
    url_prefix: String,
}

impl LocalDiskSink {
    pub fn new(directory: PathBuf, url_prefix: &str) -> Self {
        Self {
            directory,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TileSink for LocalDiskSink {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn persist(&self, key: &TileKey, tile: &Tile) -> Result<String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| Error::internal(format!("create output directory {}: {e}", self.directory.display())))?;

        let file_name = key.file_name();
        let path = self.directory.join(&file_name);
        tokio::fs::write(&path, &tile.bytes)
            .await
            .map_err(|e| Error::internal(format!("write tile {}: {e}", path.display())))?;

        debug!(path = %path.display(), bytes = tile.bytes.len(), "Wrote tile");
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }
}
