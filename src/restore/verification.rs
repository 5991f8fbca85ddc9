// dbbackup/src/restore/verification.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{DatabaseEngine, DatabaseTarget};
use crate::errors::describe;
use crate::utils::setting::{mysql_options, pg_options};

const PG_TABLES_QUERY: &str = "SELECT tablename::text FROM pg_catalog.pg_tables \
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema')";
const MYSQL_TABLES_QUERY: &str =
    "SELECT CAST(table_name AS CHAR) FROM information_schema.tables WHERE table_schema = DATABASE()";

/// Read-only introspection of the restored database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    async fn list_tables(&self, target: &DatabaseTarget) -> Result<Vec<String>>;
}

pub struct SqlSchemaInspector {
    query_timeout: Duration,
}

impl SqlSchemaInspector {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    async fn query_tables(target: &DatabaseTarget) -> Result<Vec<String>> {
        let tables = match target.engine {
            DatabaseEngine::Postgres => {
                let mut conn = PgConnection::connect_with(&pg_options(target))
                    .await
                    .context("Failed to connect for verification")?;
                let tables = sqlx::query_scalar::<_, String>(PG_TABLES_QUERY)
                    .fetch_all(&mut conn)
                    .await
                    .context("Failed to list tables")?;
                let _ = conn.close().await;
                tables
            }
            DatabaseEngine::Mysql => {
                let mut conn = MySqlConnection::connect_with(&mysql_options(target))
                    .await
                    .context("Failed to connect for verification")?;
                let tables = sqlx::query_scalar::<_, String>(MYSQL_TABLES_QUERY)
                    .fetch_all(&mut conn)
                    .await
                    .context("Failed to list tables")?;
                let _ = conn.close().await;
                tables
            }
        };
        Ok(tables)
    }
}

#[async_trait]
impl SchemaInspector for SqlSchemaInspector {
    async fn list_tables(&self, target: &DatabaseTarget) -> Result<Vec<String>> {
        timeout(self.query_timeout, Self::query_tables(target))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Table listing timed out after {}s",
                    self.query_timeout.as_secs()
                )
            })?
    }
}

/// Coarse post-restore sanity check: passes when at least one table exists.
/// Catches a restore that did nothing; does not detect partial or corrupt data.
pub struct RestoreVerifier {
    inspector: Arc<dyn SchemaInspector>,
}

impl RestoreVerifier {
    pub fn new(inspector: Arc<dyn SchemaInspector>) -> Self {
        Self { inspector }
    }

    pub async fn verify(&self, target: &DatabaseTarget) -> bool {
        match self.inspector.list_tables(target).await {
            Ok(tables) if tables.is_empty() => {
                warn!(db = %target.database_name, "no tables found after restore");
                false
            }
            Ok(tables) => {
                info!(
                    db = %target.database_name,
                    table_count = tables.len(),
                    tables = ?tables,
                    "restore verification passed"
                );
                true
            }
            Err(e) => {
                warn!(db = %target.database_name, error = %describe(&e), "verification query failed");
                false
            }
        }
    }
}
