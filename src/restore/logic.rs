// dbbackup/src/restore/logic.rs
use std::io;
use std::path::PathBuf;

use super::selection::{prompt_selection, select, Selection};
use crate::artifact::Location;
use crate::context::OperationContext;
use crate::errors::{BackupError, Result};
use crate::storage::catalog::Catalog;
use crate::utils::lock::TargetLock;

/// How the operator picks the backup to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreRequest {
    /// Most recent local backup.
    Latest,
    /// A catalog token (`N` or `rN`); invalid tokens abort.
    Token(String),
    /// An explicit file on disk, bypassing the catalog.
    File(PathBuf),
    /// Prompt on the terminal until a valid choice is made.
    Interactive,
}

enum Choice {
    Path(PathBuf),
    Catalogued(Selection),
}

async fn load_catalog(ctx: &OperationContext) -> Result<Catalog> {
    let catalog = ctx.catalog().load().await;
    if catalog.is_empty() {
        return Err(BackupError::InvalidSelection("No backup files found".to_string()));
    }
    Ok(catalog)
}

async fn choose(ctx: &OperationContext, request: RestoreRequest) -> Result<Choice> {
    let selection = match request {
        RestoreRequest::File(path) => return Ok(Choice::Path(path)),
        RestoreRequest::Latest => select(&load_catalog(ctx).await?, "")?,
        RestoreRequest::Token(token) => select(&load_catalog(ctx).await?, &token)?,
        RestoreRequest::Interactive => {
            let catalog = load_catalog(ctx).await?;
            let stdin = io::stdin();
            prompt_selection(&catalog, &mut stdin.lock(), &mut io::stdout())?
        }
    };
    Ok(Choice::Catalogued(selection))
}

/// ChooseSource → ChooseArtifact → (Download if remote) → Restore → Verify.
///
/// Selection happens before anything touches the disk, so an invalid choice
/// leaves no trace. Returns the path of the artifact that was applied.
pub async fn perform_restore_orchestration(ctx: &OperationContext, request: RestoreRequest) -> Result<PathBuf> {
    let target = &ctx.config.database;
    let backup_dir = &ctx.config.backup_dir;

    let choice = choose(ctx, request).await?;
    let _lock = TargetLock::acquire(backup_dir, &target.database_name)?;

    let artifact_path = match choice {
        Choice::Path(path) => path,
        Choice::Catalogued(Selection {
            location: Location::Local,
            identifier,
        }) => backup_dir.join(identifier),
        Choice::Catalogued(Selection {
            location: Location::Remote,
            identifier,
        }) => {
            let remote = ctx.remote.as_ref().ok_or_else(|| {
                BackupError::Config("remote backup selected but no bucket is configured".to_string())
            })?;
            let artifact = remote.download(&identifier, backup_dir).await?;
            println!("✅ Downloaded {}", artifact.name);
            artifact.local_path(backup_dir)
        }
    };

    println!("ℹ️ Restoring from: {}", artifact_path.display());
    ctx.restorer.restore(target, &artifact_path).await?;
    println!("✅ Restore successful from: {}", artifact_path.display());

    if !ctx.verifier.verify(target).await {
        return Err(BackupError::VerificationInconclusive(format!(
            "no tables found in {} after restoring {}",
            target.database_name,
            artifact_path.display()
        )));
    }
    println!("✅ Verification passed for {}", target.database_name);

    Ok(artifact_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteBucketRef;
    use crate::context::test_config;
    use crate::errors::ErrorKind;
    use crate::restore::verification::MockSchemaInspector;
    use crate::storage::memory::MemoryObjectStore;
    use crate::storage::RemoteStore;
    use crate::utils::command::{CommandOutcome, MockCommandRunner};
    use crate::utils::naming::SystemClock;
    use crate::utils::setting::MockConnectionChecker;
    use std::fs;
    use std::io::{Read, Write};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const OLDER: &str = "shop_backup_2024-01-01_00-00-00.sql";
    const NEWER: &str = "shop_backup_2024-01-02_00-00-00.sql";

    struct Harness {
        checker: MockConnectionChecker,
        runner: MockCommandRunner,
        inspector: MockSchemaInspector,
        remote: Option<Arc<RemoteStore>>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                checker: MockConnectionChecker::new(),
                runner: MockCommandRunner::new(),
                inspector: MockSchemaInspector::new(),
                remote: None,
            }
        }

        fn healthy(mut self, tables: Vec<String>) -> Self {
            self.checker.expect_is_reachable().return_const(true);
            self.runner.expect_run_with_stdin_from().times(1).returning(|_, _| {
                Ok(CommandOutcome {
                    exit_code: Some(0),
                    stderr: String::new(),
                })
            });
            self.inspector
                .expect_list_tables()
                .times(1)
                .returning(move |_| Ok(tables.clone()));
            self
        }

        fn untouched(mut self) -> Self {
            self.checker.expect_is_reachable().never();
            self.runner.expect_run_with_stdin_from().never();
            self.inspector.expect_list_tables().never();
            self
        }

        fn context(self, dir: &Path) -> OperationContext {
            OperationContext::new(
                &test_config(dir),
                Arc::new(self.checker),
                Arc::new(self.runner),
                Arc::new(SystemClock),
                Arc::new(self.inspector),
                self.remote,
            )
        }
    }

    fn seed(dir: &Path) {
        fs::write(dir.join(OLDER), b"CREATE TABLE old_orders();").expect("seed");
        fs::write(dir.join(NEWER), b"CREATE TABLE orders();").expect("seed");
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn latest_local_backup_restores_and_verifies() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path());
        let ctx = Harness::new().healthy(vec!["orders".into()]).context(dir.path());

        let applied = perform_restore_orchestration(&ctx, RestoreRequest::Latest).await?;

        assert_eq!(applied, dir.path().join(NEWER));
        Ok(())
    }

    #[tokio::test]
    async fn token_selects_older_backup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path());
        let ctx = Harness::new().healthy(vec!["old_orders".into()]).context(dir.path());

        let applied = perform_restore_orchestration(&ctx, RestoreRequest::Token("2".into())).await?;

        assert_eq!(applied, dir.path().join(OLDER));
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_selection_touches_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path());
        let before = names_in(dir.path());
        let ctx = Harness::new().untouched().context(dir.path());

        let err = perform_restore_orchestration(&ctx, RestoreRequest::Token("3".into()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidSelection);
        assert_eq!(names_in(dir.path()), before);
        Ok(())
    }

    #[tokio::test]
    async fn empty_catalog_is_invalid_selection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = Harness::new().untouched().context(dir.path());

        let err = perform_restore_orchestration(&ctx, RestoreRequest::Latest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidSelection);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_artifact_not_found() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = Harness::new().untouched().context(dir.path());

        let err = perform_restore_orchestration(&ctx, RestoreRequest::File(dir.path().join("gone.sql")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
        Ok(())
    }

    #[tokio::test]
    async fn remote_selection_downloads_then_restores() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MemoryObjectStore::with_bucket("db-backups");
        store.insert("shop_backup_2024-03-01_00-00-00.sql", b"CREATE TABLE remote_orders();");
        let mut harness = Harness::new().healthy(vec!["remote_orders".into()]);
        harness.remote = Some(Arc::new(RemoteStore::new(
            Arc::new(store),
            RemoteBucketRef {
                bucket_name: "db-backups".into(),
                folder_prefix: None,
            },
            Duration::from_secs(5),
        )));
        let ctx = harness.context(dir.path());

        let applied = perform_restore_orchestration(&ctx, RestoreRequest::Token("r1".into())).await?;

        assert_eq!(applied, dir.path().join("shop_backup_2024-03-01_00-00-00.sql"));
        assert_eq!(fs::read(&applied)?, b"CREATE TABLE remote_orders();");
        Ok(())
    }

    #[tokio::test]
    async fn empty_database_after_restore_is_inconclusive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path());
        let ctx = Harness::new().healthy(vec![]).context(dir.path());

        let err = perform_restore_orchestration(&ctx, RestoreRequest::Latest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::VerificationInconclusive);
        Ok(())
    }

    #[tokio::test]
    async fn failed_backup_is_never_restored_as_latest() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(OLDER), b"GOOD FULL DUMP")?;
        let mut harness = Harness::new();
        harness.checker.expect_is_reachable().return_const(true);
        harness
            .runner
            .expect_run_with_stdout_to()
            .times(1)
            .returning(|_, mut file| {
                file.write_all(b"-- truncated")?;
                Ok(CommandOutcome {
                    exit_code: Some(1),
                    stderr: "pg_dump: error: connection lost".into(),
                })
            });
        let fed = Arc::new(Mutex::new(Vec::new()));
        let sink = fed.clone();
        harness
            .runner
            .expect_run_with_stdin_from()
            .times(1)
            .returning(move |_, mut file| {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                *sink.lock().expect("sink") = bytes;
                Ok(CommandOutcome {
                    exit_code: Some(0),
                    stderr: String::new(),
                })
            });
        harness
            .inspector
            .expect_list_tables()
            .returning(|_| Ok(vec!["orders".into()]));
        let ctx = harness.context(dir.path());

        let backup = crate::backup::run_backup_flow(&ctx, crate::backup::BackupOptions::default()).await;
        assert_eq!(backup.unwrap_err().kind(), ErrorKind::DumpFailed);

        let applied = perform_restore_orchestration(&ctx, RestoreRequest::Latest).await?;

        assert_eq!(applied, dir.path().join(OLDER));
        assert_eq!(*fed.lock().expect("sink"), b"GOOD FULL DUMP");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_target_stops_before_restore() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path());
        let mut harness = Harness::new();
        harness.checker.expect_is_reachable().return_const(false);
        harness.runner.expect_run_with_stdin_from().never();
        harness.inspector.expect_list_tables().never();
        let ctx = harness.context(dir.path());

        let err = perform_restore_orchestration(&ctx, RestoreRequest::Latest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unreachable);
        Ok(())
    }
}
