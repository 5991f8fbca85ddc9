mod logic;
pub(crate) mod db_dump;

pub use logic::BackupOptions;

use crate::artifact::BackupArtifact;
use crate::context::OperationContext;
use crate::errors::Result;

/// Public entry point for the backup process.
pub async fn run_backup_flow(ctx: &OperationContext, options: BackupOptions) -> Result<BackupArtifact> {
    logic::perform_backup_orchestration(ctx, options).await
}
