// dbbackup/src/backup/logic.rs
use tracing::{debug, info};

use crate::artifact::BackupArtifact;
use crate::context::OperationContext;
use crate::errors::{BackupError, Result};
use crate::utils::lock::TargetLock;

#[derive(Debug, Clone, Copy)]
pub struct BackupOptions {
    /// Copy the artifact to the bucket when one is configured.
    pub upload: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        BackupOptions { upload: true }
    }
}

/// HealthCheck → Lock → Dump → (optional) Upload. Stops at the first
/// failure: a failed dump never reaches the upload step, and a failed upload
/// leaves the local artifact where it is.
pub async fn perform_backup_orchestration(
    ctx: &OperationContext,
    options: BackupOptions,
) -> Result<BackupArtifact> {
    let target = &ctx.config.database;
    let backup_dir = &ctx.config.backup_dir;
    info!(db = %target.identity(), dir = %backup_dir.display(), "backup started");

    // Probe first so an unreachable target leaves the filesystem untouched.
    ctx.dumper.ensure_reachable(target).await?;
    println!("✅ Connected to {}", target.identity());
    let _lock = TargetLock::acquire(backup_dir, &target.database_name)?;

    let artifact = ctx.dumper.dump_reachable(target, backup_dir).await?;
    debug!(artifact = %artifact.name, created_at = ?artifact.created_at, "local artifact recorded");
    println!(
        "✅ Backup successful: {} ({} bytes)",
        artifact.local_path(backup_dir).display(),
        artifact.size_bytes.unwrap_or_default()
    );

    if !options.upload {
        println!("ℹ️ Upload skipped on request.");
        return Ok(artifact);
    }

    let Some(remote) = &ctx.remote else {
        info!("no remote storage configured, keeping local artifact only");
        return Ok(artifact);
    };

    if !remote.bucket_exists().await {
        return Err(BackupError::BucketInaccessible(remote.bucket().bucket_name.clone()));
    }
    remote.upload(&artifact, backup_dir).await?;
    println!(
        "✅ Uploaded {} to bucket {}",
        artifact.name,
        remote.bucket().bucket_name
    );

    Ok(artifact)
}
