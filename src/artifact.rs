use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Local,
    Remote,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local => f.write_str("local"),
            Location::Remote => f.write_str("remote"),
        }
    }
}

/// A finished backup file, either on local disk or in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub name: String,
    pub location: Location,
    pub created_at: Option<NaiveDateTime>,
    pub size_bytes: Option<u64>,
}

impl BackupArtifact {
    /// Path of this artifact inside a local backup directory.
    pub fn local_path(&self, backup_dir: &Path) -> PathBuf {
        backup_dir.join(&self.name)
    }
}
