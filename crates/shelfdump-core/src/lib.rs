//! Export, reload-script assembly and rotation of MySQL backups.
//!
//! A run enumerates the databases of a server, exports every table's rows
//! with `SELECT ... INTO OUTFILE` inside one consistent batch, writes the
//! SQL scripts that recreate and reload each database with deferred index
//! builds, packs everything into `<backup_dir>/<day>/<db>.tgz`, and finally
//! prunes old dated backup directories.
//!
//! # Example
//!
//! ```rust,no_run
//! use shelfdump_core::{BackupConfig, ConnectionConfig, MySqlConnector, Orchestrator, TarArchiver};
//!
//! # async fn example() -> shelfdump_core::Result<()> {
//! let connection = ConnectionConfig::socket("backup", "/var/run/mysqld/mysqld.sock");
//! let config = BackupConfig::new(connection.clone()).with_engine_override("ROCKSDB");
//!
//! let connector = MySqlConnector::new(connection);
//! let archiver = TarArchiver::new(&config.nice);
//! let summary = Orchestrator::new(&config, &connector, &archiver).run().await?;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod assemble;
pub mod config;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod retention;
pub mod retry;
pub mod session;
pub mod staging;

pub use archive::{Archiver, TarArchiver};
pub use assemble::{ArtifactAssembler, ExportJob, InstructionFile};
pub use config::{BackupConfig, ConfigFile, ConnectionConfig, Endpoint, Grouping};
pub use error::{Error, Result};
pub use filter::{NameFilter, Pattern};
pub use orchestrator::{
    DatabaseReport, LogProgress, Orchestrator, Outcome, Progress, RunSummary, TableReport,
};
pub use retention::{
    active_directory_name, parse_backup_date, rotate, RetentionBudget, RetentionManager,
    RotationReport,
};
pub use retry::{RetryController, RetryPolicy, RetryableUnit};
pub use session::{
    classify_error_code, Connector, ExportSession, FailureClass, Isolation, MySqlConnector,
    ObjectDefinition, Row, RowFormat, SessionError, SessionSettings, SqlConnection,
};
pub use staging::StagingArea;
