// dbbackup/src/context.rs
use std::sync::Arc;

use crate::backup::db_dump::DumpExecutor;
use crate::config::AppConfig;
use crate::restore::db_restore::RestoreExecutor;
use crate::restore::verification::{RestoreVerifier, SchemaInspector, SqlSchemaInspector};
use crate::storage::catalog::BackupCatalog;
use crate::storage::s3::S3ObjectStore;
use crate::storage::RemoteStore;
use crate::utils::command::{CommandRunner, ProcessRunner};
use crate::utils::naming::{Clock, SystemClock};
use crate::utils::setting::{ConnectionChecker, SqlConnectionChecker};

/// Everything a flow needs, wired once from the configuration.
pub struct OperationContext {
    pub config: AppConfig,
    pub dumper: DumpExecutor,
    pub restorer: RestoreExecutor,
    pub verifier: RestoreVerifier,
    pub remote: Option<Arc<RemoteStore>>,
}

impl OperationContext {
    pub fn new(
        config: &AppConfig,
        checker: Arc<dyn ConnectionChecker>,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
        inspector: Arc<dyn SchemaInspector>,
        remote: Option<Arc<RemoteStore>>,
    ) -> Self {
        OperationContext {
            config: config.clone(),
            dumper: DumpExecutor::new(checker.clone(), runner.clone(), clock),
            restorer: RestoreExecutor::new(checker, runner),
            verifier: RestoreVerifier::new(inspector),
            remote,
        }
    }

    /// Production wiring: sqlx probes, real child processes, S3 when configured.
    pub async fn from_config(config: &AppConfig) -> Self {
        let timeouts = config.timeouts;
        let remote = match &config.remote {
            Some(s3_config) => {
                let store = S3ObjectStore::from_config(s3_config).await;
                Some(Arc::new(RemoteStore::new(
                    Arc::new(store),
                    s3_config.bucket.clone(),
                    timeouts.transfer,
                )))
            }
            None => None,
        };

        Self::new(
            config,
            Arc::new(SqlConnectionChecker::new(timeouts.probe)),
            Arc::new(ProcessRunner::new(timeouts.command)),
            Arc::new(SystemClock),
            Arc::new(SqlSchemaInspector::new(timeouts.probe)),
            remote,
        )
    }

    pub fn catalog(&self) -> BackupCatalog {
        BackupCatalog::new(&self.config.backup_dir, self.remote.clone())
    }
}

#[cfg(test)]
pub(crate) fn test_config(backup_dir: &std::path::Path) -> AppConfig {
    use crate::config::{DatabaseEngine, DatabaseTarget, Secret, Timeouts};

    AppConfig {
        database: DatabaseTarget {
            engine: DatabaseEngine::Postgres,
            host: "db.internal".into(),
            port: 5432,
            user: "backup".into(),
            password: Some(Secret::new("hunter2")),
            database_name: "shop".into(),
        },
        backup_dir: backup_dir.to_path_buf(),
        remote: None,
        timeouts: Timeouts::default(),
    }
}
