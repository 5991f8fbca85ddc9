// dbbackup/src/utils/lock.rs
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::errors::{BackupError, Result};

/// Marker file held while a backup or restore runs against one database.
/// Holds the owner's PID and is removed on drop. A lock whose owner is no
/// longer running (killed, interrupted, aborted) is reclaimed on the next
/// acquire.
#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
}

impl TargetLock {
    pub fn acquire(backup_dir: &Path, database_name: &str) -> Result<Self> {
        fs::create_dir_all(backup_dir).map_err(|e| {
            BackupError::Config(format!(
                "Failed to create backup directory {}: {}",
                backup_dir.display(),
                e
            ))
        })?;

        let path = backup_dir.join(format!(".{}.lock", database_name));
        match Self::create(&path)? {
            Some(lock) => Ok(lock),
            None => {
                let Some(owner) = stale_owner(&path) else {
                    return Err(BackupError::Locked(database_name.to_string()));
                };
                warn!(lock = %path.display(), pid = owner, "reclaiming lock left by a process that is gone");
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != IoErrorKind::NotFound {
                        return Err(BackupError::Config(format!(
                            "Failed to remove stale lock file {}: {}",
                            path.display(),
                            e
                        )));
                    }
                }
                // Another run may have reclaimed it first.
                Self::create(&path)?.ok_or_else(|| BackupError::Locked(database_name.to_string()))
            }
        }
    }

    fn create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).map_err(|e| {
                    let _ = fs::remove_file(path);
                    BackupError::Config(format!("Failed to write lock file {}: {}", path.display(), e))
                })?;
                debug!(lock = %path.display(), "acquired target lock");
                Ok(Some(TargetLock {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(BackupError::Config(format!(
                "Failed to create lock file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// PID recorded in the lock file, if that process no longer exists.
/// Unreadable or empty files count as held: the owner may not have
/// written its PID yet.
fn stale_owner(path: &Path) -> Option<u32> {
    let pid: u32 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
    if pid == std::process::id() || process_alive(pid) {
        return None;
    }
    Some(pid)
}

fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
