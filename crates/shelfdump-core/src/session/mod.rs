//! Export session over a live source-database connection.
//!
//! [`SqlConnection`] and [`Connector`] are the seams to the database server;
//! [`ExportSession`] builds every statement the export needs on top of them
//! and tracks the open transaction or lock batch.

pub mod mysql;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use shelfdump_ddl::quote_identifier;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::NameFilter;

pub use mysql::MySqlConnector;

/// Session `wait_timeout` applied on connect, in seconds.
pub const WAIT_TIMEOUT_SECS: u32 = 28800;

/// Terminator clause used for CSV row files, on export and on reload.
pub const CSV_TERMINATORS: &str =
    "FIELDS TERMINATED BY ';' OPTIONALLY ENCLOSED BY '\"' LINES TERMINATED BY '\\n'";

/// One result row, every column as text (`None` for SQL NULL).
pub type Row = Vec<Option<String>>;

/// How a failed statement should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Lost or refused connection, lock wait timeout, deadlock.
    Transient,
    /// Malformed statement or any unrecognized server error.
    Terminal,
    /// Missing privilege.
    Permission,
    /// Unknown database or table.
    Missing,
}

/// Classify a server or client error number.
pub fn classify_error_code(code: u16) -> FailureClass {
    match code {
        // too many connections, server shutdown, lock wait timeout, deadlock
        1040 | 1053 | 1205 | 1213 => FailureClass::Transient,
        // socket/tcp refused, server gone away, lost connection
        2002 | 2003 | 2006 | 2013 | 2055 => FailureClass::Transient,
        1044 | 1045 | 1142 | 1143 | 1227 | 1370 => FailureClass::Permission,
        1049 | 1051 | 1146 => FailureClass::Missing,
        _ => FailureClass::Terminal,
    }
}

/// A failed statement or connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub class: FailureClass,
    /// Server error number, when the server sent one.
    pub code: Option<u16>,
    pub message: String,
}

impl SessionError {
    /// Build an error from a server error number.
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            class: classify_error_code(code),
            code: Some(code),
            message: message.into(),
        }
    }

    /// A failure of the connection itself, without an error number.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            code: None,
            message: message.into(),
        }
    }

    /// A failure that retrying will not fix.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Terminal,
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (error {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SessionError {}

/// A live connection that speaks SQL.
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a statement that returns rows.
    async fn query(&mut self, sql: &str) -> std::result::Result<Vec<Row>, SessionError>;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, SessionError>;

    /// Close the connection. Further calls fail.
    async fn close(&mut self);
}

/// Opens new connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> std::result::Result<Box<dyn SqlConnection>, SessionError>;
}

/// How an export batch is isolated from concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// `START TRANSACTION WITH CONSISTENT SNAPSHOT` ... `COMMIT`.
    #[default]
    Snapshot,
    /// `LOCK TABLES ... READ` ... `UNLOCK TABLES`.
    Lock,
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Isolation::Snapshot),
            "lock" => Ok(Isolation::Lock),
            other => Err(format!("unknown isolation mode: {}", other)),
        }
    }
}

/// Layout of exported row files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowFormat {
    /// The server's default tab-separated dump format.
    #[default]
    Native,
    /// Semicolon-separated, optionally quoted fields.
    Csv,
}

impl RowFormat {
    /// File extension of row files in this format.
    pub fn extension(self) -> &'static str {
        match self {
            RowFormat::Native => "data",
            RowFormat::Csv => "csv",
        }
    }

    /// Field and line terminator clause, shared by export and reload.
    pub fn terminators(self) -> Option<&'static str> {
        match self {
            RowFormat::Native => None,
            RowFormat::Csv => Some(CSV_TERMINATORS),
        }
    }
}

/// A table definition as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDefinition {
    pub name: String,
    pub text: String,
}

/// Per-session settings taken from the run configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory the server is allowed to write row files into.
    pub secure_root: PathBuf,
    pub isolation: Isolation,
    pub row_format: RowFormat,
}

/// Quote a string literal for inclusion in a statement.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A checked connection plus the state of its export batch.
pub struct ExportSession {
    conn: Box<dyn SqlConnection>,
    settings: SessionSettings,
    batch_open: bool,
}

impl ExportSession {
    /// Connect and run the pre-flight checks.
    ///
    /// Fails with a configuration error when the server's `secure_file_priv`
    /// is unset or differs from the configured secure root.
    pub async fn establish(connector: &dyn Connector, settings: SessionSettings) -> Result<Self> {
        let conn = connector.connect().await?;
        let mut session = Self {
            conn,
            settings,
            batch_open: false,
        };
        if let Err(e) = session.preflight().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn preflight(&mut self) -> Result<()> {
        self.execute(&format!("SET SESSION wait_timeout={}", WAIT_TIMEOUT_SECS))
            .await?;
        let rows = self.query("SHOW VARIABLES LIKE 'secure_file_priv'").await?;
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(1))
            .flatten()
            .unwrap_or_default();

        if value.is_empty() {
            return Err(Error::config(
                "server secure_file_priv is not set; row export needs a confined directory",
            ));
        }
        if Path::new(&value) != self.settings.secure_root {
            return Err(Error::config(format!(
                "server secure_file_priv is {}, configured secure root is {}",
                value,
                self.settings.secure_root.display()
            )));
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql, "query");
        Ok(self.conn.query(sql).await?)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        debug!(sql, "execute");
        Ok(self.conn.execute(sql).await?)
    }

    /// Database names accepted by `filter`, in server order.
    pub async fn enumerate_objects(&mut self, filter: &NameFilter) -> Result<Vec<String>> {
        let names = first_column(self.query("SHOW DATABASES").await?);
        Ok(filter.apply(names))
    }

    /// Base tables of a database, views excluded.
    pub async fn list_tables(&mut self, database: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SHOW FULL TABLES FROM {} WHERE Table_type = 'BASE TABLE'",
            quote_identifier(database)
        );
        Ok(first_column(self.query(&sql).await?))
    }

    /// Number of tables of `database` stored in `engine`.
    pub async fn count_engine_tables(&mut self, database: &str, engine: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = {} AND ENGINE = {}",
            quote_literal(database),
            quote_literal(engine)
        );
        let rows = self.query(&sql).await?;
        let count = first_column(rows).into_iter().next().unwrap_or_default();
        count
            .trim()
            .parse()
            .map_err(|_| Error::from(SessionError::terminal(format!("unexpected count {:?}", count))))
    }

    /// The `CREATE TABLE` text of a table.
    pub async fn fetch_definition(&mut self, database: &str, table: &str) -> Result<ObjectDefinition> {
        let sql = format!(
            "SHOW CREATE TABLE {}.{}",
            quote_identifier(database),
            quote_identifier(table)
        );
        let rows = self.query(&sql).await?;
        let text = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(1))
            .flatten()
            .ok_or_else(|| {
                SessionError::terminal(format!("no definition returned for `{}`", table))
            })?;
        Ok(ObjectDefinition {
            name: table.to_string(),
            text,
        })
    }

    /// Whether an export batch is open on this session.
    pub fn in_batch(&self) -> bool {
        self.batch_open
    }

    /// Open the export batch unless one is already open.
    pub async fn begin_batch(&mut self, database: &str, tables: &[String]) -> Result<()> {
        if self.batch_open {
            return Ok(());
        }
        match self.settings.isolation {
            Isolation::Snapshot => {
                self.execute("START TRANSACTION WITH CONSISTENT SNAPSHOT")
                    .await?;
            }
            Isolation::Lock => {
                if !tables.is_empty() {
                    let db = quote_identifier(database);
                    let list: Vec<String> = tables
                        .iter()
                        .map(|t| format!("{}.{} READ", db, quote_identifier(t)))
                        .collect();
                    self.execute(&format!("LOCK TABLES {}", list.join(", ")))
                        .await?;
                }
            }
        }
        self.batch_open = true;
        Ok(())
    }

    /// Close the export batch if one is open.
    pub async fn end_batch(&mut self) -> Result<()> {
        if !self.batch_open {
            return Ok(());
        }
        self.batch_open = false;
        match self.settings.isolation {
            Isolation::Snapshot => self.execute("COMMIT").await?,
            Isolation::Lock => self.execute("UNLOCK TABLES").await?,
        };
        Ok(())
    }

    /// Export a table's rows into a server-side file, returning its size.
    pub async fn export_rows(
        &mut self,
        database: &str,
        table: &str,
        destination: &Path,
        order_by: Option<&str>,
    ) -> Result<u64> {
        let mut sql = format!(
            "SELECT * INTO OUTFILE {}",
            quote_literal(&destination.to_string_lossy())
        );
        if let Some(terminators) = self.settings.row_format.terminators() {
            sql.push(' ');
            sql.push_str(terminators);
        }
        sql.push_str(&format!(
            " FROM {}.{}",
            quote_identifier(database),
            quote_identifier(table)
        ));
        if let Some(columns) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(columns);
        }
        self.execute(&sql).await?;

        let metadata = tokio::fs::metadata(destination).await?;
        Ok(metadata.len())
    }

    /// Close the underlying connection.
    pub async fn close(mut self) {
        self.conn.close().await;
    }
}

fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect()
}
