// dbbackup/src/utils/naming.rs
use chrono::{DateTime, Local, NaiveDateTime};
#[cfg(test)]
use chrono::TimeZone;
use regex::Regex;
use std::sync::OnceLock;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const ARTIFACT_EXTENSION: &str = ".sql";

/// Source of "now" for artifact names.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Always returns the same instant.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Local>);

#[cfg(test)]
impl FixedClock {
    pub fn at(naive: NaiveDateTime) -> Self {
        let instant = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive));
        FixedClock(instant)
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

fn artifact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+_backup_(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})\.sql$")
            .expect("artifact name pattern is valid")
    })
}

/// `<db>_backup_<YYYY-MM-DD_HH-MM-SS>.sql`. Fixed-width timestamps keep plain
/// string order equal to chronological order for one database. Two dumps of
/// the same database within one second produce the same name.
pub fn generate_name(database_name: &str, clock: &dyn Clock) -> String {
    format!(
        "{}_backup_{}{}",
        database_name,
        clock.now().format(TIMESTAMP_FORMAT),
        ARTIFACT_EXTENSION
    )
}

pub fn is_artifact_name(name: &str) -> bool {
    artifact_pattern().is_match(name)
}

/// Creation time encoded in an artifact name, if it is one.
pub fn parse_timestamp(name: &str) -> Option<NaiveDateTime> {
    let captures = artifact_pattern().captures(name)?;
    NaiveDateTime::parse_from_str(captures.get(1)?.as_str(), TIMESTAMP_FORMAT).ok()
}
