// dbbackup/src/storage/catalog.rs
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::RemoteStore;
use crate::utils::naming;

/// Newest first. Names carry a fixed-width timestamp, so descending string
/// order is descending creation order.
pub fn sort_newest_first(names: &mut [String]) {
    names.sort_by(|a, b| b.cmp(a));
}

/// Artifact names in `dir`, newest first. A missing or unreadable directory
/// yields an empty list.
pub fn list_local(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            debug!(dir = %dir.display(), "backup directory does not exist yet");
            return Vec::new();
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to read backup directory");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| naming::is_artifact_name(name))
        .collect();
    sort_newest_first(&mut names);
    names
}

/// Both listings offered to the operator at restore time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub local: Vec<String>,
    pub remote: Vec<String>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

pub struct BackupCatalog {
    backup_dir: PathBuf,
    remote: Option<Arc<RemoteStore>>,
}

impl BackupCatalog {
    pub fn new(backup_dir: &Path, remote: Option<Arc<RemoteStore>>) -> Self {
        Self {
            backup_dir: backup_dir.to_path_buf(),
            remote,
        }
    }

    pub async fn load(&self) -> Catalog {
        let local = list_local(&self.backup_dir);
        let remote = match &self.remote {
            Some(store) => Self::list_remote(store).await,
            None => Vec::new(),
        };

        Catalog { local, remote }
    }

    async fn list_remote(store: &RemoteStore) -> Vec<String> {
        if !store.bucket_exists().await {
            warn!(bucket = %store.bucket().bucket_name, "bucket inaccessible, remote backups unavailable");
            return Vec::new();
        }

        let mut names: Vec<String> = store
            .list()
            .await
            .into_iter()
            .filter(|name| naming::is_artifact_name(name))
            .collect();
        sort_newest_first(&mut names);
        names
    }
}
