use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a failed operation, used by callers to decide
/// whether to abort a flow and by the CLI to report the failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unreachable,
    DumpFailed,
    UploadFailed,
    DownloadFailed,
    ArtifactNotFound,
    RestoreFailed,
    VerificationInconclusive,
    BucketInaccessible,
    InvalidSelection,
    Config,
    Locked,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::DumpFailed => "dump failed",
            ErrorKind::UploadFailed => "upload failed",
            ErrorKind::DownloadFailed => "download failed",
            ErrorKind::ArtifactNotFound => "artifact not found",
            ErrorKind::RestoreFailed => "restore failed",
            ErrorKind::VerificationInconclusive => "verification inconclusive",
            ErrorKind::BucketInaccessible => "bucket inaccessible",
            ErrorKind::InvalidSelection => "invalid selection",
            ErrorKind::Config => "configuration error",
            ErrorKind::Locked => "target locked",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Database server {0} is not reachable")]
    Unreachable(String),

    #[error("Dump failed: {0}")]
    DumpFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Backup artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("Restore verification inconclusive: {0}")]
    VerificationInconclusive(String),

    #[error("Bucket {0} is not accessible")]
    BucketInaccessible(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Another operation holds the lock for database {0}")]
    Locked(String),
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Unreachable(_) => ErrorKind::Unreachable,
            BackupError::DumpFailed(_) => ErrorKind::DumpFailed,
            BackupError::UploadFailed(_) => ErrorKind::UploadFailed,
            BackupError::DownloadFailed(_) => ErrorKind::DownloadFailed,
            BackupError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            BackupError::RestoreFailed(_) => ErrorKind::RestoreFailed,
            BackupError::VerificationInconclusive(_) => ErrorKind::VerificationInconclusive,
            BackupError::BucketInaccessible(_) => ErrorKind::BucketInaccessible,
            BackupError::InvalidSelection(_) => ErrorKind::InvalidSelection,
            BackupError::Config(_) => ErrorKind::Config,
            BackupError::Locked(_) => ErrorKind::Locked,
        }
    }
}

/// Flattens an anyhow chain into a single line for the error payload.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

pub type Result<T> = std::result::Result<T, BackupError>;
