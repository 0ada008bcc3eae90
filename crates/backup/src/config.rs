//! Run configuration, built once at startup and handed to the dumper and loader.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use store::{PgStore, RestStore, RowStore, StoreError};

use crate::tables::{default_tables, TableSpec};
use crate::ConfigError;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const KEY_FALLBACK_VAR: &str = "SUPABASE_KEY";
pub const HOME_VAR: &str = "BACKUP_HOME";

/// Service-role keys are JWTs, whose base64 header always starts like this.
pub const CREDENTIAL_PREFIX: &str = "eyJ";

const BACKUPS_DIR: &str = "backups";
const PG_MAX_CONNECTIONS: u32 = 2;

/// How to reach the store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreSettings {
    /// Hosted data API with a bearer credential.
    Rest { url: String, api_key: String },
    /// Direct Postgres connection; credentials live in the URL.
    Postgres { url: String },
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest { url, .. } => f
                .debug_struct("Rest")
                .field("url", url)
                .field("api_key", &"<redacted>")
                .finish(),
            Self::Postgres { url } => f
                .debug_struct("Postgres")
                .field("url", &store::postgres::redact_password(url))
                .finish(),
        }
    }
}

impl StoreSettings {
    /// Open a client for these settings.
    pub async fn connect(&self) -> Result<Arc<dyn RowStore>, StoreError> {
        match self {
            Self::Rest { url, api_key } => Ok(Arc::new(RestStore::new(url.clone(), api_key)?)),
            Self::Postgres { url } => Ok(Arc::new(PgStore::connect(url, PG_MAX_CONNECTIONS).await?)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreSettings,
    /// Tables in backup and restore order.
    pub tables: Vec<TableSpec>,
    /// Directory relative backup paths are resolved against.
    pub base_dir: PathBuf,
    /// Directory holding the `backup_<timestamp>` folders.
    pub backups_root: PathBuf,
    /// Plan restores without writing to the store.
    pub dry_run: bool,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Like [`Config::from_env`], with a base directory the caller already resolved.
    pub fn from_env_in(base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::from_lookup_in(env_lookup, base_dir)
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Blank values count as unset. The credential is checked before any
    /// client is created.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = base_dir_from_lookup(&lookup);
        Self::from_lookup_in(lookup, base_dir)
    }

    /// Build the configuration from `lookup`, ignoring `BACKUP_HOME`.
    pub fn from_lookup_in<F>(lookup: F, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let url = get(URL_VAR).ok_or(ConfigError::MissingUrl(URL_VAR))?;
        let store = if is_postgres_url(&url) {
            StoreSettings::Postgres { url }
        } else {
            let api_key = get(KEY_VAR)
                .or_else(|| get(KEY_FALLBACK_VAR))
                .ok_or(ConfigError::MissingCredential {
                    primary: KEY_VAR,
                    fallback: KEY_FALLBACK_VAR,
                })?;
            if !api_key.starts_with(CREDENTIAL_PREFIX) {
                return Err(ConfigError::MalformedCredential(CREDENTIAL_PREFIX));
            }
            StoreSettings::Rest { url, api_key }
        };

        Ok(Self::new(store, base_dir))
    }

    /// Configuration with the default tables and `<base_dir>/backups` as backups root.
    pub fn new(store: StoreSettings, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            store,
            tables: default_tables(),
            backups_root: base_dir.join(BACKUPS_DIR),
            base_dir,
            dry_run: false,
        }
    }

    pub fn with_backups_root(mut self, root: impl AsRef<Path>) -> Self {
        self.backups_root = self.base_dir.join(root.as_ref());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// `BACKUP_HOME` if set, otherwise the current directory.
pub fn base_dir_from_env() -> PathBuf {
    base_dir_from_lookup(&env_lookup)
}

fn base_dir_from_lookup<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(HOME_VAR)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default backups root under `base_dir`.
pub fn default_backups_root(base_dir: &Path) -> PathBuf {
    base_dir.join(BACKUPS_DIR)
}
