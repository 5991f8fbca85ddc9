// dbbackup/src/config/mod.rs
use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_BACKUP_DIR: &str = "backups";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 1800;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDatabaseConfig {
    pub engine: Option<DatabaseEngine>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonTimeouts {
    pub probe_secs: Option<u64>,
    pub command_secs: Option<u64>,
    pub transfer_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database_url: Option<String>,
    pub database: Option<JsonDatabaseConfig>,
    pub backup_dir: Option<PathBuf>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub timeouts: Option<JsonTimeouts>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Postgres,
    Mysql,
}

impl DatabaseEngine {
    pub fn default_port(self) -> u16 {
        match self {
            DatabaseEngine::Postgres => 5432,
            DatabaseEngine::Mysql => 3306,
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseEngine::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseEngine::Mysql),
            other => Err(anyhow::anyhow!("Unsupported database engine: {}", other)),
        }
    }
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Connection parameters for the one database this tool backs up.
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub engine: DatabaseEngine,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<Secret>,
    pub database_name: String,
}

impl DatabaseTarget {
    /// `user@host:port/db`, safe to log.
    pub fn identity(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBucketRef {
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

impl RemoteBucketRef {
    /// Object key for an artifact name, honouring the folder prefix.
    pub fn key_for(&self, name: &str) -> String {
        match self.key_prefix() {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Folder prefix normalised to end with a single `/`.
    pub fn key_prefix(&self) -> Option<String> {
        self.folder_prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/", p))
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: RemoteBucketRef,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<Secret>,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub probe: Duration,
    pub command: Duration,
    pub transfer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            probe: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            command: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            transfer: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

/// Application configuration, built once at startup and handed to every
/// component by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseTarget,
    pub backup_dir: PathBuf,
    pub remote: Option<S3Config>,
    pub timeouts: Timeouts,
}

impl AppConfig {
    /// Reads `config_path` (optional on disk) and layers process environment
    /// variables on top. Call `dotenv` beforehand to pick up a `.env` file.
    pub fn load(config_path: &Path) -> Result<Self> {
        let raw = if config_path.exists() {
            let config_content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
            serde_json::from_str(&config_content).with_context(|| {
                format!("Failed to parse JSON from config file at {}", config_path.display())
            })?
        } else {
            debug!(path = %config_path.display(), "config file not found, using environment only");
            RawJsonConfig::default()
        };

        Self::resolve(raw, |key| std::env::var(key).ok())
    }

    /// Merges the raw file config with values from `env`; env wins.
    pub fn resolve<F>(raw: RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let mut db = match &raw.database_url {
            Some(url) => parse_database_url(url)?,
            None => JsonDatabaseConfig::default(),
        };
        if let Some(file_db) = raw.database.clone() {
            db.engine = file_db.engine.or(db.engine);
            db.host = file_db.host.or(db.host);
            db.port = file_db.port.or(db.port);
            db.user = file_db.user.or(db.user);
            db.password = file_db.password.or(db.password);
            db.name = file_db.name.or(db.name);
        }

        let engine = match env("DB_ENGINE") {
            Some(value) => DatabaseEngine::parse(&value)?,
            None => db.engine.unwrap_or_default(),
        };
        let port = match env("DB_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("DB_PORT is not a valid port: {}", value))?,
            None => db.port.unwrap_or_else(|| engine.default_port()),
        };
        let user = env("DB_USER")
            .or(db.user)
            .context("Database user must be set (DB_USER or database.user in config.json)")?;
        let database_name = env("DB_NAME")
            .or(db.name)
            .context("Database name must be set (DB_NAME or database.name in config.json)")?;
        if !is_safe_identifier(&database_name) {
            anyhow::bail!("Invalid character in database name: {:?}", database_name);
        }

        let database = DatabaseTarget {
            engine,
            host: env("DB_HOST").or(db.host).unwrap_or_else(|| "localhost".to_string()),
            port,
            user,
            password: env("DB_PASSWORD").or(db.password).map(Secret::new),
            database_name,
        };

        let backup_dir = env("BACKUP_DIR")
            .map(PathBuf::from)
            .or(raw.backup_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));

        let remote = resolve_s3(raw.s3_storage.unwrap_or_default(), &env)?;

        let file_timeouts = raw.timeouts.unwrap_or_default();
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            probe: file_timeouts.probe_secs.map(Duration::from_secs).unwrap_or(defaults.probe),
            command: file_timeouts.command_secs.map(Duration::from_secs).unwrap_or(defaults.command),
            transfer: file_timeouts.transfer_secs.map(Duration::from_secs).unwrap_or(defaults.transfer),
        };

        Ok(AppConfig {
            database,
            backup_dir,
            remote,
            timeouts,
        })
    }
}

fn resolve_s3<F>(file: JsonS3StorageConfig, env: &F) -> Result<Option<S3Config>>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let bucket_name = env("S3_BUCKET").or(non_empty(file.bucket_name));
    let region = env("S3_REGION").or(non_empty(file.region));
    let endpoint_url = env("S3_ENDPOINT_URL").or(non_empty(file.endpoint_url));
    let access_key_id = env("S3_ACCESS_KEY_ID").or(non_empty(file.access_key_id));
    let secret_access_key = env("S3_SECRET_ACCESS_KEY").or(non_empty(file.secret_access_key));
    let folder_prefix = env("S3_FOLDER_PREFIX").or(non_empty(file.folder_prefix));

    let Some(bucket_name) = bucket_name else {
        if region.is_some() || endpoint_url.is_some() || access_key_id.is_some() {
            // Only warn if some S3 fields were provided without a bucket
            warn!("S3 settings are present but no bucket name is configured; remote storage is disabled");
        }
        return Ok(None);
    };

    if access_key_id.is_some() != secret_access_key.is_some() {
        anyhow::bail!("S3 access_key_id and secret_access_key must be provided together");
    }

    Ok(Some(S3Config {
        bucket: RemoteBucketRef {
            bucket_name,
            folder_prefix,
        },
        region,
        endpoint_url,
        access_key_id,
        secret_access_key: secret_access_key.map(Secret::new),
    }))
}

fn parse_database_url(db_url: &str) -> Result<JsonDatabaseConfig> {
    let parsed = Url::parse(db_url).context("Invalid database_url format")?;
    let engine = DatabaseEngine::parse(parsed.scheme())?;
    let name = parsed.path().trim_start_matches('/');
    Ok(JsonDatabaseConfig {
        engine: Some(engine),
        host: parsed.host_str().map(str::to_string),
        port: parsed.port(),
        user: Some(parsed.username())
            .filter(|u| !u.is_empty())
            .map(|u| decode_url_part(u, "user"))
            .transpose()?,
        password: parsed.password().map(|p| decode_url_part(p, "password")).transpose()?,
        name: Some(name)
            .filter(|n| !n.is_empty())
            .map(|n| decode_url_part(n, "database name"))
            .transpose()?,
    })
}

// Url keeps userinfo and path percent-encoded.
fn decode_url_part(raw: &str, what: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .with_context(|| format!("database_url {} is not valid UTF-8 after decoding", what))
}

/// Database names end up in artifact file names, so they are limited to the
/// characters the artifact name pattern accepts.
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
