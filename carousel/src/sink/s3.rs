use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::debug;
use url::Url;

use super::TileSink;
use crate::config::S3StorageConfig;
use crate::errors::{Error, Result};
use crate::pipeline::extract::{Tile, TileKey};

/// Uploads tiles to an S3-compatible bucket with a public-read ACL.
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
    key_prefix: String,
    acl: Option<ObjectCannedAcl>,
    /// Tile URLs are this joined with the object key; always ends in `/`
    public_base: Url,
}

impl S3Sink {
    /// Build a client from the AWS default provider chain plus the configured overrides.
    pub async fn from_config(config: &S3StorageConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.as_str());
        }

        let region = sdk_config.region().map(|r| r.to_string());
        Self::new(Client::from_conf(builder.build()), config, region.as_deref())
    }

    pub fn new(client: Client, config: &S3StorageConfig, region: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            acl: config.public_read.then_some(ObjectCannedAcl::PublicRead),
            public_base: public_base_url(config, region)?,
        })
    }

    pub fn object_key(&self, key: &TileKey) -> String {
        format!("{}{}", self.key_prefix, key.file_name())
    }
}

/// Resolve the base URL tiles are served from.
///
/// Preference order: explicit `public_base_url`, then path-style under a custom endpoint, then the
/// virtual-hosted AWS URL for the bucket's region.
fn public_base_url(config: &S3StorageConfig, region: Option<&str>) -> anyhow::Result<Url> {
    if let Some(base) = &config.public_base_url {
        return Ok(with_trailing_slash(base));
    }

    if let Some(endpoint) = &config.endpoint_url {
        return with_trailing_slash(endpoint)
            .join(&format!("{}/", config.bucket))
            .with_context(|| format!("build public URL for bucket {} under {endpoint}", config.bucket));
    }

    let region = region.context("No AWS region configured: set storage.region, AWS_REGION, or storage.public_base_url")?;
    Url::parse(&format!("https://{}.s3.{}.amazonaws.com/", config.bucket, region))
        .with_context(|| format!("build public URL for bucket {} in {region}", config.bucket))
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl TileSink for S3Sink {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn persist(&self, key: &TileKey, tile: &Tile) -> Result<String> {
        let object_key = self.object_key(key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type("image/jpeg")
            .body(ByteStream::from(tile.bytes.clone()));
        if let Some(acl) = &self.acl {
            request = request.acl(acl.clone());
        }

        request.send().await.map_err(|e| {
            Error::Other(anyhow::anyhow!(
                "upload {object_key} to bucket {}: {}",
                self.bucket,
                DisplayErrorContext(&e)
            ))
        })?;

        let url = self
            .public_base
            .join(&object_key)
            .map_err(|e| Error::internal(format!("build URL for {object_key}: {e}")))?;

        debug!(bucket = %self.bucket, key = %object_key, bytes = tile.bytes.len(), "Uploaded tile");
        Ok(url.to_string())
    }
}
