// Database connectivity helpers
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{DatabaseEngine, DatabaseTarget};

/// Liveness gate run before every dump and restore.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionChecker: Send + Sync {
    /// `false` on any failure; never an error.
    async fn is_reachable(&self, target: &DatabaseTarget) -> bool;
}

pub(crate) fn pg_options(target: &DatabaseTarget) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.user)
        .database(&target.database_name);
    match &target.password {
        Some(password) => options.password(password.expose()),
        None => options,
    }
}

pub(crate) fn mysql_options(target: &DatabaseTarget) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.user)
        .database(&target.database_name);
    match &target.password {
        Some(password) => options.password(password.expose()),
        None => options,
    }
}

/// Connects with sqlx and pings the server.
pub struct SqlConnectionChecker {
    probe_timeout: Duration,
}

impl SqlConnectionChecker {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    async fn probe(target: &DatabaseTarget) -> Result<(), sqlx::Error> {
        match target.engine {
            DatabaseEngine::Postgres => {
                let mut conn = PgConnection::connect_with(&pg_options(target)).await?;
                conn.ping().await?;
                conn.close().await
            }
            DatabaseEngine::Mysql => {
                let mut conn = MySqlConnection::connect_with(&mysql_options(target)).await?;
                conn.ping().await?;
                conn.close().await
            }
        }
    }
}

#[async_trait]
impl ConnectionChecker for SqlConnectionChecker {
    async fn is_reachable(&self, target: &DatabaseTarget) -> bool {
        match timeout(self.probe_timeout, Self::probe(target)).await {
            Ok(Ok(())) => {
                debug!(db = %target.identity(), "database reachable");
                true
            }
            Ok(Err(e)) => {
                warn!(db = %target.identity(), error = %e, "database probe failed");
                false
            }
            Err(_) => {
                warn!(
                    db = %target.identity(),
                    timeout_secs = self.probe_timeout.as_secs(),
                    "database probe timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn closed_port_target() -> DatabaseTarget {
        DatabaseTarget {
            engine: DatabaseEngine::Postgres,
            host: "127.0.0.1".into(),
            port: 1,
            user: "nobody".into(),
            password: Some(Secret::new("x")),
            database_name: "none".into(),
        }
    }

    #[tokio::test]
    async fn unreachable_server_reports_false() {
        let checker = SqlConnectionChecker::new(Duration::from_secs(2));
        assert!(!checker.is_reachable(&closed_port_target()).await);
    }

    #[tokio::test]
    async fn unreachable_mysql_server_reports_false() {
        let checker = SqlConnectionChecker::new(Duration::from_secs(2));
        let target = DatabaseTarget {
            engine: DatabaseEngine::Mysql,
            ..closed_port_target()
        };
        assert!(!checker.is_reachable(&target).await);
    }
}
