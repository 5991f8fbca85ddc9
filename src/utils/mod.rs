pub mod command;
pub mod lock;
pub mod naming;
pub mod setting;

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use which::which;

/// Finds a client tool (pg_dump, psql, mysqldump, mysql) in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).with_context(|| {
        format!(
            "{} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.",
            name
        )
    })
}

/// Hidden sibling of `final_path` that receives bytes until the write is
/// known to be complete. Never matches the artifact name pattern.
pub fn part_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

/// Moves a finished part file to `final_path` without ever replacing an
/// existing file there. Fails with `AlreadyExists` in that case and leaves
/// the part file for the caller to deal with.
pub fn publish_part(part_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::hard_link(part_path, final_path) {
        Ok(()) => fs::remove_file(part_path),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(_) => {
            // Filesystems without hard links.
            if final_path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", final_path.display()),
                ));
            }
            fs::rename(part_path, final_path)
        }
    }
}

/// Byte-for-byte comparison of two files.
pub fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut left = BufReader::new(File::open(a)?);
    let mut right = BufReader::new(File::open(b)?);
    let mut left_buf = [0u8; 8192];
    let mut right_buf = [0u8; 8192];
    loop {
        let read = left.read(&mut left_buf)?;
        if read == 0 {
            return Ok(true);
        }
        right.read_exact(&mut right_buf[..read])?;
        if left_buf[..read] != right_buf[..read] {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::naming;

    #[test]
    fn part_path_is_hidden_and_not_an_artifact() {
        let part = part_path_for(Path::new("/tmp/backups/shop_backup_2024-01-01_00-00-00.sql"));
        let name = part.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with(".shop_backup_2024-01-01_00-00-00.sql."));
        assert!(name.ends_with(".part"));
        assert!(!naming::is_artifact_name(name));
        assert_eq!(part.parent(), Some(Path::new("/tmp/backups")));
    }

    #[test]
    fn publish_part_never_replaces_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let final_path = dir.path().join("shop_backup_2024-01-01_00-00-00.sql");
        fs::write(&final_path, b"original")?;
        let part = part_path_for(&final_path);
        fs::write(&part, b"newer")?;

        let err = publish_part(&part, &final_path).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&final_path)?, b"original");
        assert!(part.exists());
        Ok(())
    }

    #[test]
    fn publish_part_moves_into_place() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let final_path = dir.path().join("shop_backup_2024-01-01_00-00-00.sql");
        let part = part_path_for(&final_path);
        fs::write(&part, b"dump")?;

        publish_part(&part, &final_path)?;

        assert_eq!(fs::read(&final_path)?, b"dump");
        assert!(!part.exists());
        Ok(())
    }

    #[test]
    fn same_contents_compares_bytes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"CREATE TABLE orders();")?;
        fs::write(&b, b"CREATE TABLE orders();")?;
        fs::write(&c, b"CREATE TABLE ORDERS();")?;

        assert!(same_contents(&a, &b)?);
        assert!(!same_contents(&a, &c)?);
        Ok(())
    }
}
