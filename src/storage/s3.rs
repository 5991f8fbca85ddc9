// dbbackup/src/storage/s3.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ObjectStore;
use crate::config::S3Config;

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO).
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    /// Static credentials and endpoint are used when configured; otherwise the
    /// default AWS provider chain applies.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id,
                secret.expose(),
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        // Custom endpoints (MinIO and friends) generally need path-style addressing.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        S3ObjectStore {
            client: s3::Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("HeadBucket failed for bucket {}", bucket))?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", source.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to S3 bucket {} with key {}",
                    source.display(),
                    bucket,
                    key
                )
            })?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .with_context(|| format!("ListObjectsV2 failed for bucket {}", bucket))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key()).map(str::to_string));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(bucket, count = keys.len(), "listed bucket objects");
        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64> {
        let mut object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object s3://{}/{}", bucket, key))?;

        let mut output_file = File::create(destination)
            .await
            .with_context(|| format!("Failed to create destination file: {}", destination.display()))?;

        let mut total_bytes_downloaded: u64 = 0;
        while let Some(bytes_chunk) = object
            .body
            .try_next()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{}", bucket, key))?
        {
            output_file
                .write_all(&bytes_chunk)
                .await
                .with_context(|| format!("Failed to write to destination file: {}", destination.display()))?;
            total_bytes_downloaded += bytes_chunk.len() as u64;
        }
        output_file
            .sync_all()
            .await
            .with_context(|| format!("Failed to flush destination file: {}", destination.display()))?;

        Ok(total_bytes_downloaded)
    }
}
