// dbbackup/src/backup/db_dump.rs
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{BackupArtifact, Location};
use crate::config::{DatabaseEngine, DatabaseTarget};
use crate::errors::{describe, BackupError, Result};
use crate::utils::command::{CommandRunner, ToolInvocation};
use crate::utils;
use crate::utils::naming::{self, Clock};
use crate::utils::setting::ConnectionChecker;

/// Builds the dump tool call for a target. The password travels in the
/// child's environment, never on the command line.
pub(crate) fn dump_invocation(target: &DatabaseTarget) -> ToolInvocation {
    let password = target.password.as_ref().map(|p| p.expose()).unwrap_or("");
    match target.engine {
        DatabaseEngine::Postgres => ToolInvocation::new("pg_dump")
            .arg("--no-password")
            .arg("--host")
            .arg(&target.host)
            .arg("--port")
            .arg(target.port.to_string())
            .arg("--username")
            .arg(&target.user)
            .arg("--dbname")
            .arg(&target.database_name)
            .env("PGPASSWORD", password),
        DatabaseEngine::Mysql => ToolInvocation::new("mysqldump")
            .arg(format!("--host={}", target.host))
            .arg(format!("--port={}", target.port))
            .arg(format!("--user={}", target.user))
            .arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg(&target.database_name)
            .env("MYSQL_PWD", password),
    }
}

/// Produces a local `.sql` artifact from a reachable database.
pub struct DumpExecutor {
    checker: Arc<dyn ConnectionChecker>,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl DumpExecutor {
    pub fn new(
        checker: Arc<dyn ConnectionChecker>,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { checker, runner, clock }
    }

    /// Dumps `target` into `destination_dir`.
    ///
    /// The reachability check is a hard precondition: an unreachable server
    /// fails with `Unreachable` before any file is created. Output goes to a
    /// hidden part file that is renamed to the artifact name only after a
    /// zero exit and a non-empty check, so a failed dump never looks like a
    /// backup.
    pub async fn dump(&self, target: &DatabaseTarget, destination_dir: &Path) -> Result<BackupArtifact> {
        self.ensure_reachable(target).await?;
        self.dump_reachable(target, destination_dir).await
    }

    pub async fn ensure_reachable(&self, target: &DatabaseTarget) -> Result<()> {
        if !self.checker.is_reachable(target).await {
            return Err(BackupError::Unreachable(target.identity()));
        }
        Ok(())
    }

    /// `dump` without the probe, for callers that just ran `ensure_reachable`.
    pub async fn dump_reachable(&self, target: &DatabaseTarget, destination_dir: &Path) -> Result<BackupArtifact> {
        let name = naming::generate_name(&target.database_name, self.clock.as_ref());
        fs::create_dir_all(destination_dir).map_err(|e| {
            BackupError::DumpFailed(format!(
                "Failed to create backup directory {}: {}",
                destination_dir.display(),
                e
            ))
        })?;

        let artifact_path = destination_dir.join(&name);
        if artifact_path.exists() {
            return Err(BackupError::DumpFailed(format!(
                "Artifact {} already exists; refusing to overwrite it",
                artifact_path.display()
            )));
        }

        // The tool writes into a hidden part file; only a complete dump gets
        // the artifact name.
        let part_path = utils::part_path_for(&artifact_path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .map_err(|e| {
                BackupError::DumpFailed(format!(
                    "Failed to create dump file {}: {}",
                    part_path.display(),
                    e
                ))
            })?;

        let invocation = dump_invocation(target);
        info!(command = %invocation.describe(), artifact = %artifact_path.display(), "starting dump");

        let size_bytes = match self.run_dump(&invocation, file, &part_path).await {
            Ok(size_bytes) => size_bytes,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part_path) {
                    warn!(part = %part_path.display(), error = %cleanup, "could not remove partial dump");
                }
                return Err(e);
            }
        };

        utils::publish_part(&part_path, &artifact_path).map_err(|e| {
            let _ = fs::remove_file(&part_path);
            if e.kind() == IoErrorKind::AlreadyExists {
                BackupError::DumpFailed(format!(
                    "Artifact {} already exists; refusing to overwrite it",
                    artifact_path.display()
                ))
            } else {
                BackupError::DumpFailed(format!(
                    "Failed to move dump into place at {}: {}",
                    artifact_path.display(),
                    e
                ))
            }
        })?;

        info!(artifact = %name, size_bytes, "dump completed");
        Ok(BackupArtifact {
            created_at: naming::parse_timestamp(&name),
            name,
            location: Location::Local,
            size_bytes: Some(size_bytes),
        })
    }

    async fn run_dump(&self, invocation: &ToolInvocation, file: File, part_path: &Path) -> Result<u64> {
        let outcome = self
            .runner
            .run_with_stdout_to(invocation, file)
            .await
            .map_err(|e| BackupError::DumpFailed(describe(&e)))?;

        if !outcome.success() {
            warn!(exit_code = ?outcome.exit_code, "dump failed, discarding partial output");
            return Err(BackupError::DumpFailed(format!(
                "{} exited with status {:?}: {}",
                invocation.program, outcome.exit_code, outcome.stderr
            )));
        }

        let size_bytes = fs::metadata(part_path)
            .map_err(|e| BackupError::DumpFailed(format!("Failed to stat {}: {}", part_path.display(), e)))?
            .len();
        if size_bytes == 0 {
            return Err(BackupError::DumpFailed(format!(
                "{} produced an empty file",
                invocation.program
            )));
        }
        Ok(size_bytes)
    }
}
