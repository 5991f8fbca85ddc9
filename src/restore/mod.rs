mod logic;
pub(crate) mod db_restore;
pub(crate) mod selection;
pub(crate) mod verification;

pub use logic::RestoreRequest;

use std::path::PathBuf;

use crate::context::OperationContext;
use crate::errors::Result;

/// Public entry point for the restore process.
pub async fn run_restore_flow(ctx: &OperationContext, request: RestoreRequest) -> Result<PathBuf> {
    logic::perform_restore_orchestration(ctx, request).await
}
