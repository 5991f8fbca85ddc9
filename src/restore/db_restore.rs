// dbbackup/src/restore/db_restore.rs
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DatabaseEngine, DatabaseTarget};
use crate::errors::{describe, BackupError, Result};
use crate::utils::command::{CommandRunner, ToolInvocation};
use crate::utils::setting::ConnectionChecker;

/// Builds the client call that replays a dump read from stdin.
pub(crate) fn restore_invocation(target: &DatabaseTarget) -> ToolInvocation {
    let password = target.password.as_ref().map(|p| p.expose()).unwrap_or("");
    match target.engine {
        DatabaseEngine::Postgres => ToolInvocation::new("psql")
            .arg("-X") // Do not read psqlrc
            .arg("-q")
            .arg("--no-password")
            .arg("-v")
            .arg("ON_ERROR_STOP=1") // Exit on first error
            .arg("--host")
            .arg(&target.host)
            .arg("--port")
            .arg(target.port.to_string())
            .arg("--username")
            .arg(&target.user)
            .arg("--dbname")
            .arg(&target.database_name)
            .env("PGPASSWORD", password),
        DatabaseEngine::Mysql => ToolInvocation::new("mysql")
            .arg(format!("--host={}", target.host))
            .arg(format!("--port={}", target.port))
            .arg(format!("--user={}", target.user))
            .arg(&target.database_name)
            .env("MYSQL_PWD", password),
    }
}

pub struct RestoreExecutor {
    checker: Arc<dyn ConnectionChecker>,
    runner: Arc<dyn CommandRunner>,
}

impl RestoreExecutor {
    pub fn new(checker: Arc<dyn ConnectionChecker>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { checker, runner }
    }

    /// Replays `artifact_path` into `target`.
    ///
    /// Checks, in order, that the artifact exists and that the server is
    /// reachable; the client tool only runs once both hold. Not transactional:
    /// a failure part-way leaves whatever was already applied.
    pub async fn restore(&self, target: &DatabaseTarget, artifact_path: &Path) -> Result<()> {
        if !artifact_path.is_file() {
            return Err(BackupError::ArtifactNotFound(artifact_path.to_path_buf()));
        }
        if !self.checker.is_reachable(target).await {
            return Err(BackupError::Unreachable(target.identity()));
        }

        let input = File::open(artifact_path).map_err(|e| {
            BackupError::RestoreFailed(format!("Failed to open {}: {}", artifact_path.display(), e))
        })?;

        let invocation = restore_invocation(target);
        info!(command = %invocation.describe(), artifact = %artifact_path.display(), "starting restore");

        let outcome = self
            .runner
            .run_with_stdin_from(&invocation, input)
            .await
            .map_err(|e| BackupError::RestoreFailed(describe(&e)))?;

        if !outcome.success() {
            warn!(exit_code = ?outcome.exit_code, "restore failed; database may be partially restored");
            return Err(BackupError::RestoreFailed(format!(
                "{} exited with status {:?}: {}",
                invocation.program, outcome.exit_code, outcome.stderr
            )));
        }

        info!(artifact = %artifact_path.display(), "restore completed");
        Ok(())
    }
}
