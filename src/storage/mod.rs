// dbbackup/src/storage/mod.rs
pub mod catalog;
#[cfg(test)]
pub(crate) mod memory;
pub mod s3;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::artifact::{BackupArtifact, Location};
use crate::config::RemoteBucketRef;
use crate::errors::{describe, BackupError, Result};
use crate::utils::{self, naming};
use catalog::sort_newest_first;

/// Raw bucket operations. Implementations report every failure as an error;
/// `RemoteStore` decides what each failure means.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> AnyResult<()>;

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> AnyResult<()>;

    /// Every key under `prefix` (empty for the whole bucket).
    async fn list_objects(&self, bucket: &str, prefix: &str) -> AnyResult<Vec<String>>;

    /// Streams the object into `destination`, returning the byte count.
    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> AnyResult<u64>;
}

/// Backup-aware view of one bucket.
pub struct RemoteStore {
    store: Arc<dyn ObjectStore>,
    bucket: RemoteBucketRef,
    transfer_timeout: Duration,
}

impl RemoteStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: RemoteBucketRef, transfer_timeout: Duration) -> Self {
        Self {
            store,
            bucket,
            transfer_timeout,
        }
    }

    pub fn bucket(&self) -> &RemoteBucketRef {
        &self.bucket
    }

    /// Fails closed: any error means "does not exist".
    pub async fn bucket_exists(&self) -> bool {
        match timeout(self.transfer_timeout, self.store.head_bucket(&self.bucket.bucket_name)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(bucket = %self.bucket.bucket_name, error = %describe(&e), "bucket check failed");
                false
            }
            Err(_) => {
                warn!(bucket = %self.bucket.bucket_name, "bucket check timed out");
                false
            }
        }
    }

    /// Copies a local artifact into the bucket under its own name. The local
    /// file is left in place whatever the outcome.
    pub async fn upload(&self, artifact: &BackupArtifact, backup_dir: &Path) -> Result<BackupArtifact> {
        let source = artifact.local_path(backup_dir);
        let key = self.bucket.key_for(&artifact.name);
        info!(source = %source.display(), bucket = %self.bucket.bucket_name, key = %key, "starting upload");

        match timeout(
            self.transfer_timeout,
            self.store.put_object(&self.bucket.bucket_name, &key, &source),
        )
        .await
        {
            Ok(Ok(())) => {
                info!(bucket = %self.bucket.bucket_name, key = %key, "upload completed");
                Ok(BackupArtifact {
                    location: Location::Remote,
                    ..artifact.clone()
                })
            }
            Ok(Err(e)) => Err(BackupError::UploadFailed(describe(&e))),
            Err(_) => Err(BackupError::UploadFailed(format!(
                "Upload of {} timed out after {}s",
                artifact.name,
                self.transfer_timeout.as_secs()
            ))),
        }
    }

    /// Identifiers in the bucket, newest first. Empty when the bucket is empty,
    /// missing or unreadable.
    pub async fn list(&self) -> Vec<String> {
        let prefix = self.bucket.key_prefix().unwrap_or_default();
        let keys = match timeout(
            self.transfer_timeout,
            self.store.list_objects(&self.bucket.bucket_name, &prefix),
        )
        .await
        {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => {
                warn!(bucket = %self.bucket.bucket_name, error = %describe(&e), "listing bucket failed");
                return Vec::new();
            }
            Err(_) => {
                warn!(bucket = %self.bucket.bucket_name, "listing bucket timed out");
                return Vec::new();
            }
        };

        let mut identifiers: Vec<String> = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .collect();
        sort_newest_first(&mut identifiers);
        identifiers
    }

    /// Fetches `identifier` into `destination_dir`. The object lands in a
    /// hidden `.part` file first and is renamed once complete.
    pub async fn download(&self, identifier: &str, destination_dir: &Path) -> Result<BackupArtifact> {
        if identifier.is_empty()
            || identifier.contains('/')
            || identifier.contains('\\')
            || identifier == "."
            || identifier == ".."
        {
            return Err(BackupError::DownloadFailed(format!(
                "Refusing to download suspicious identifier {:?}",
                identifier
            )));
        }

        fs::create_dir_all(destination_dir).map_err(|e| {
            BackupError::DownloadFailed(format!(
                "Failed to create directory for download {}: {}",
                destination_dir.display(),
                e
            ))
        })?;

        let key = self.bucket.key_for(identifier);
        let final_path = destination_dir.join(identifier);
        let part_path = utils::part_path_for(&final_path);
        info!(bucket = %self.bucket.bucket_name, key = %key, destination = %final_path.display(), "starting download");

        let fetched = timeout(
            self.transfer_timeout,
            self.store.get_object(&self.bucket.bucket_name, &key, &part_path),
        )
        .await;
        let size_bytes = match fetched {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                let _ = fs::remove_file(&part_path);
                return Err(BackupError::DownloadFailed(describe(&e)));
            }
            Err(_) => {
                let _ = fs::remove_file(&part_path);
                return Err(BackupError::DownloadFailed(format!(
                    "Download of {} timed out after {}s",
                    identifier,
                    self.transfer_timeout.as_secs()
                )));
            }
        };

        // An existing local artifact is never replaced. A byte-identical copy
        // is reused; anything else is a conflict.
        match utils::publish_part(&part_path, &final_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let identical = utils::same_contents(&part_path, &final_path);
                let _ = fs::remove_file(&part_path);
                match identical {
                    Ok(true) => info!(path = %final_path.display(), "local copy already matches remote object"),
                    Ok(false) => {
                        return Err(BackupError::DownloadFailed(format!(
                            "A different local file already exists at {}; not replacing it",
                            final_path.display()
                        )));
                    }
                    Err(e) => {
                        return Err(BackupError::DownloadFailed(format!(
                            "Failed to compare download with existing {}: {}",
                            final_path.display(),
                            e
                        )));
                    }
                }
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                return Err(BackupError::DownloadFailed(format!(
                    "Failed to move download into place at {}: {}",
                    final_path.display(),
                    e
                )));
            }
        }

        info!(key = %key, size_bytes, "download completed");
        Ok(BackupArtifact {
            name: identifier.to_string(),
            location: Location::Local,
            created_at: naming::parse_timestamp(identifier),
            size_bytes: Some(size_bytes),
        })
    }
}
