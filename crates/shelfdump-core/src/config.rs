//! Run configuration.
//!
//! A [`BackupConfig`] is built once per run, from the config file and the
//! command line, and handed by reference to every component.
//!
//! # Example Configuration
//!
//! ```toml
//! [client]
//! user = "backup"
//! password = "secret"
//! socket = "/var/run/mysqld/mysqld.sock"
//!
//! [backup]
//! exclude = ["information_schema", "performance_schema", "sys", "mysql", "*_tmp"]
//! weekday_limit = 10
//! sunday_limit = 4
//! backup_dir = "/srv/backups"
//! secure_file_priv = "/home"
//! grouping = "phased"
//! engine = "ROCKSDB"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::filter::NameFilter;
use crate::retention::RetentionBudget;
use crate::retry::RetryPolicy;
use crate::session::{Isolation, RowFormat, SessionSettings};

/// Databases never exported unless named explicitly.
pub const DEFAULT_EXCLUDE: &[&str] = &["information_schema", "performance_schema", "sys", "mysql"];

/// Weekday backup directories kept by rotation.
pub const DEFAULT_WEEKDAY_LIMIT: usize = 10;

/// Sunday backup directories kept by rotation.
pub const DEFAULT_SUNDAY_LIMIT: usize = 4;

/// Root of the dated backup directories.
pub const DEFAULT_BACKUP_DIR: &str = "/srv/backups";

/// Directory the server may write row files into.
pub const DEFAULT_SECURE_FILE_PRIV: &str = "/home";

/// Command prefix that lowers the archiver's CPU and IO priority.
pub const DEFAULT_NICE: &str = "nice -n 15 ionice -c2 -n5";

/// Default TCP port when none is configured.
pub const DEFAULT_PORT: u16 = 3306;

/// Default host when neither socket nor host is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Socket(PathBuf),
    Tcp { host: String, port: u16 },
}

/// Credentials and endpoint of the source server.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub user: String,
    pub password: Option<String>,
    pub endpoint: Endpoint,
}

impl ConnectionConfig {
    /// Connect through a unix socket.
    pub fn socket(user: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            password: None,
            endpoint: Endpoint::Socket(path.into()),
        }
    }

    /// Connect over TCP.
    pub fn tcp(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            password: None,
            endpoint: Endpoint::Tcp {
                host: host.into(),
                port,
            },
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Renders the settings with the password masked.
impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user={}", self.user)?;
        if self.password.is_some() {
            write!(f, " password=********")?;
        }
        match &self.endpoint {
            Endpoint::Socket(path) => write!(f, " socket={}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, " host={} port={}", host, port),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionConfig({})", self)
    }
}

/// How instruction files are grouped per database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grouping {
    /// One file with every table's structure, load and indexes in turn.
    #[default]
    Combined,
    /// Structure, load, index and maintenance files, run one after another.
    Phased,
    /// One self-sufficient file per table.
    PerObject,
}

impl FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "combined" => Ok(Grouping::Combined),
            "phased" | "fast" => Ok(Grouping::Phased),
            "per-object" | "per_object" | "split" => Ok(Grouping::PerObject),
            other => Err(format!("unknown grouping mode: {}", other)),
        }
    }
}

/// Configuration for one backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub connection: ConnectionConfig,
    /// Export exactly these databases instead of enumerating.
    pub databases: Option<Vec<String>>,
    pub filter: NameFilter,
    pub retention: RetentionBudget,
    pub backup_dir: PathBuf,
    pub secure_root: PathBuf,
    pub retry: RetryPolicy,
    pub grouping: Grouping,
    /// Repeat database and session setup before every table.
    pub repeat_setup: bool,
    pub engine_override: Option<String>,
    /// Use bulk-load mode for databases that already hold bulk-load tables.
    pub detect_bulk_engine: bool,
    pub isolation: Isolation,
    pub row_format: RowFormat,
    /// Command prefix for the archiver.
    pub nice: String,
    /// Keep going after a database fails.
    pub ignore_failures: bool,
    pub rotate: bool,
    /// Owner (uid, gid) given to staging directories.
    pub staging_owner: Option<(u32, u32)>,
}

impl BackupConfig {
    /// Create a configuration with defaults for everything but the connection.
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            databases: None,
            filter: NameFilter::new(DEFAULT_EXCLUDE.iter().copied(), None::<String>),
            retention: RetentionBudget::new(DEFAULT_WEEKDAY_LIMIT, DEFAULT_SUNDAY_LIMIT),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            secure_root: PathBuf::from(DEFAULT_SECURE_FILE_PRIV),
            retry: RetryPolicy::default(),
            grouping: Grouping::default(),
            repeat_setup: false,
            engine_override: None,
            detect_bulk_engine: true,
            isolation: Isolation::default(),
            row_format: RowFormat::default(),
            nice: DEFAULT_NICE.to_string(),
            ignore_failures: false,
            rotate: true,
            staging_owner: None,
        }
    }

    /// Export only these databases.
    pub fn with_databases(mut self, databases: Vec<String>) -> Self {
        self.databases = Some(databases);
        self
    }

    /// Set the database filter.
    pub fn with_filter(mut self, filter: NameFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the retention budgets.
    pub fn with_retention(mut self, retention: RetentionBudget) -> Self {
        self.retention = retention;
        self
    }

    /// Set the backup root.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Set the secure export root.
    pub fn with_secure_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.secure_root = dir.into();
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the grouping mode.
    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Repeat setup statements before every table.
    pub fn with_repeat_setup(mut self, repeat: bool) -> Self {
        self.repeat_setup = repeat;
        self
    }

    /// Rewrite every table to this storage engine.
    pub fn with_engine_override(mut self, engine: impl Into<String>) -> Self {
        self.engine_override = Some(engine.into());
        self
    }

    /// Set the isolation mode.
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the row file format.
    pub fn with_row_format(mut self, format: RowFormat) -> Self {
        self.row_format = format;
        self
    }

    /// Set the archiver command prefix.
    pub fn with_nice(mut self, nice: impl Into<String>) -> Self {
        self.nice = nice.into();
        self
    }

    /// Continue with the next database after a failure.
    pub fn with_ignore_failures(mut self, ignore: bool) -> Self {
        self.ignore_failures = ignore;
        self
    }

    /// Enable or disable the rotation pass.
    pub fn with_rotate(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }

    /// Hand staging directories to this owner.
    pub fn with_staging_owner(mut self, uid: u32, gid: u32) -> Self {
        self.staging_owner = Some((uid, gid));
        self
    }

    /// Settings every export session is opened with.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            secure_root: self.secure_root.clone(),
            isolation: self.isolation,
            row_format: self.row_format,
        }
    }
}

/// Patterns written either as a list or as one separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    List(Vec<String>),
    Joined(String),
}

impl PatternList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PatternList::List(items) => items,
            PatternList::Joined(text) => text
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// The `[client]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub user: Option<String>,
    pub password: Option<String>,
    pub socket: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// The `[backup]` section. Absent keys take the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupSection {
    pub exclude: Option<PatternList>,
    pub include: Option<String>,
    pub weekday_limit: Option<usize>,
    pub sunday_limit: Option<usize>,
    pub backup_dir: Option<PathBuf>,
    pub secure_file_priv: Option<PathBuf>,
    pub retry_attempts: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub grouping: Option<Grouping>,
    pub repeat_setup: Option<bool>,
    pub engine: Option<String>,
    pub nice: Option<String>,
    pub isolation: Option<Isolation>,
    pub csv: Option<bool>,
    pub ignore_failures: Option<bool>,
    pub staging_uid: Option<u32>,
    pub staging_gid: Option<u32>,
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub backup: BackupSection,
}

impl ConfigFile {
    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Load a file; a missing file yields an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// The connection settings; a socket wins over host and port, and a
    /// missing host or port falls back to `127.0.0.1:3306`.
    pub fn connection(&self) -> Result<ConnectionConfig> {
        let client = &self.client;
        let user = client
            .user
            .clone()
            .ok_or_else(|| Error::config("[client] user is not set"))?;

        let mut connection = match (&client.socket, &client.host, client.port) {
            (Some(socket), _, _) => ConnectionConfig::socket(user, socket.clone()),
            (None, host, port) => ConnectionConfig::tcp(
                user,
                host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port.unwrap_or(DEFAULT_PORT),
            ),
        };
        if let Some(password) = &client.password {
            connection = connection.with_password(password.clone());
        }
        Ok(connection)
    }

    /// Build the run configuration.
    pub fn into_config(self) -> Result<BackupConfig> {
        let connection = self.connection()?;
        let backup = self.backup;
        let mut config = BackupConfig::new(connection);

        if backup.exclude.is_some() || backup.include.is_some() {
            let exclude = match backup.exclude {
                Some(list) => list.into_vec(),
                None => DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
            };
            config.filter = NameFilter::new(exclude, backup.include);
        }
        config.retention = RetentionBudget::new(
            backup.weekday_limit.unwrap_or(DEFAULT_WEEKDAY_LIMIT),
            backup.sunday_limit.unwrap_or(DEFAULT_SUNDAY_LIMIT),
        );
        if let Some(dir) = backup.backup_dir {
            config.backup_dir = dir;
        }
        if let Some(dir) = backup.secure_file_priv {
            config.secure_root = dir;
        }

        let mut retry = RetryPolicy::default();
        if let Some(attempts) = backup.retry_attempts {
            if attempts == 0 {
                return Err(Error::config("retry_attempts must be at least 1"));
            }
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(ms) = backup.retry_base_ms {
            retry = retry.with_base_delay(Duration::from_millis(ms));
        }
        config.retry = retry;

        config.grouping = backup.grouping.unwrap_or_default();
        config.repeat_setup = backup.repeat_setup.unwrap_or(false);
        config.engine_override = backup.engine.filter(|e| !e.is_empty());
        if let Some(nice) = backup.nice {
            config.nice = nice;
        }
        config.isolation = backup.isolation.unwrap_or_default();
        if backup.csv.unwrap_or(false) {
            config.row_format = RowFormat::Csv;
        }
        config.ignore_failures = backup.ignore_failures.unwrap_or(false);
        config.staging_owner = match (backup.staging_uid, backup.staging_gid) {
            (Some(uid), Some(gid)) => Some((uid, gid)),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "staging_uid and staging_gid must be set together",
                ))
            }
        };
        Ok(config)
    }
}
