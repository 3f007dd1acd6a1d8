//! Driving a whole backup run.
//!
//! For each selected database, in order: clear the staging area, open an
//! export batch, export every table as a retryable unit, assemble the
//! instruction files, archive the staging area into the directory of the
//! day and clear the staging area again. A rotation pass runs at the end.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use shelfdump_ddl::{split, BULK_LOAD_ENGINE};
use tracing::{debug, error, info, instrument, warn};

use crate::archive::Archiver;
use crate::assemble::{ArtifactAssembler, ExportJob};
use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::filter::NameFilter;
use crate::retention::{RetentionManager, RotationReport};
use crate::retry::{RetryController, RetryableUnit};
use crate::session::{Connector, ExportSession, RowFormat};
use crate::staging::StagingArea;

/// What happened to one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Exported { archive: PathBuf },
    Failed { reason: String },
}

/// Per-database line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseReport {
    pub database: String,
    pub tables: usize,
    pub bytes: u64,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl DatabaseReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Exported { .. })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub databases: Vec<DatabaseReport>,
    pub rotation: Option<RotationReport>,
}

impl RunSummary {
    /// Databases that did not produce an archive.
    pub fn failures(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.iter().filter(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// One exported table, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub bytes: u64,
    pub duration_ms: u64,
}

/// Receives per-database and per-table progress.
pub trait Progress: Send {
    fn database_started(&mut self, database: &str);

    /// A table's rows were exported. Ignored unless overridden.
    fn table_exported(&mut self, _database: &str, _report: &TableReport) {}

    fn database_finished(&mut self, report: &DatabaseReport);
}

/// Reports progress through the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn database_started(&mut self, database: &str) {
        info!(database, "backing up database");
    }

    fn table_exported(&mut self, database: &str, report: &TableReport) {
        info!(
            database,
            table = %report.table,
            bytes = report.bytes,
            duration_ms = report.duration_ms,
            "table exported"
        );
    }

    fn database_finished(&mut self, report: &DatabaseReport) {
        match &report.outcome {
            Outcome::Exported { archive } => info!(
                database = %report.database,
                tables = report.tables,
                bytes = report.bytes,
                duration_ms = report.duration_ms,
                archive = %archive.display(),
                "database archived"
            ),
            Outcome::Failed { reason } => error!(
                database = %report.database,
                duration_ms = report.duration_ms,
                reason = %reason,
                "database failed"
            ),
        }
    }
}

/// Runs the export of every selected database, then rotation.
pub struct Orchestrator<'a> {
    config: &'a BackupConfig,
    retry: RetryController<'a>,
    archiver: &'a dyn Archiver,
    progress: Box<dyn Progress + 'a>,
    today: Option<NaiveDate>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a BackupConfig, connector: &'a dyn Connector, archiver: &'a dyn Archiver) -> Self {
        Self {
            config,
            retry: RetryController::new(connector, config.session_settings(), config.retry),
            archiver,
            progress: Box::new(LogProgress),
            today: None,
        }
    }

    /// Report progress somewhere other than the log.
    pub fn with_progress(mut self, progress: impl Progress + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Pin the calendar date used to name the directory of the day.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Sessions established so far, reconnects included.
    pub fn establishments(&self) -> u32 {
        self.retry.establishments()
    }

    /// Export, archive and rotate.
    ///
    /// A failed database stops the run unless failures are ignored; a failed
    /// archive never does.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let outcome = self.run_inner().await;
        self.retry.shutdown().await;
        outcome
    }

    async fn run_inner(&mut self) -> Result<RunSummary> {
        let databases = match &self.config.databases {
            Some(list) => list.clone(),
            None => {
                let mut unit = EnumerateDatabases {
                    filter: &self.config.filter,
                };
                self.retry.with_retry(&mut unit).await?
            }
        };
        info!(count = databases.len(), "databases selected");

        let mut summary = RunSummary::default();
        for database in databases {
            self.progress.database_started(&database);
            let started = Instant::now();
            let result = self.export_database(&database).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let report = match &result {
                Ok(exported) => DatabaseReport {
                    database: database.clone(),
                    tables: exported.tables,
                    bytes: exported.bytes,
                    duration_ms,
                    outcome: Outcome::Exported {
                        archive: exported.archive.clone(),
                    },
                },
                Err(e) => DatabaseReport {
                    database: database.clone(),
                    tables: 0,
                    bytes: 0,
                    duration_ms,
                    outcome: Outcome::Failed {
                        reason: e.to_string(),
                    },
                },
            };
            self.progress.database_finished(&report);
            summary.databases.push(report);

            if let Err(e) = result {
                if e.aborts_run() && !self.config.ignore_failures {
                    return Err(Error::Export {
                        database,
                        source: Box::new(e),
                    });
                }
            }
        }

        if self.config.rotate {
            let manager = RetentionManager::new(&self.config.backup_dir, self.config.retention);
            summary.rotation = Some(manager.rotate()?);
        }
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn export_database(&mut self, database: &str) -> Result<Exported> {
        let staging = StagingArea::new(
            &self.config.secure_root,
            database,
            self.config.staging_owner,
        );
        staging.prepare()?;
        let result = self.export_staged(database, &staging).await;
        if let Err(e) = staging.clear() {
            warn!(database, error = %e, "staging cleanup failed");
        }
        result
    }

    async fn export_staged(&mut self, database: &str, staging: &StagingArea) -> Result<Exported> {
        let tables = self.retry.with_retry(&mut ListTables { database }).await?;
        let engine_override = self.effective_engine(database).await?;

        let exported = self
            .export_tables(database, &tables, engine_override.as_deref(), staging)
            .await;
        if let Some(session) = self.retry.session_mut() {
            if let Err(e) = session.end_batch().await {
                warn!(database, error = %e, "closing export batch failed");
            }
        }
        let jobs = exported?;

        let files = ArtifactAssembler::from_config(self.config).assemble(database, &jobs);
        staging.write_instructions(&files)?;

        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let retention = RetentionManager::new(&self.config.backup_dir, self.config.retention);
        let active = retention.prepare_active_directory(today)?;
        let archive = active.join(format!("{}.tgz", database));
        self.archiver
            .archive(&archive, staging.root(), &staging.members(&files))
            .await?;

        Ok(Exported {
            tables: jobs.len(),
            bytes: jobs.iter().map(|job| job.bytes).sum(),
            archive,
        })
    }

    async fn effective_engine(&mut self, database: &str) -> Result<Option<String>> {
        if let Some(engine) = &self.config.engine_override {
            return Ok(Some(engine.clone()));
        }
        if !self.config.detect_bulk_engine {
            return Ok(None);
        }
        let mut unit = CountEngineTables {
            database,
            engine: BULK_LOAD_ENGINE,
        };
        let count = self.retry.with_retry(&mut unit).await?;
        if count > 0 {
            info!(database, count, "database holds bulk-load engine tables");
            Ok(Some(BULK_LOAD_ENGINE.to_string()))
        } else {
            Ok(None)
        }
    }

    async fn export_tables(
        &mut self,
        database: &str,
        tables: &[String],
        engine_override: Option<&str>,
        staging: &StagingArea,
    ) -> Result<Vec<ExportJob>> {
        let mut jobs = Vec::with_capacity(tables.len());
        for table in tables {
            let mut unit = TableExport {
                database,
                table,
                tables,
                engine_override,
                staging,
                row_format: self.config.row_format,
            };
            let started = Instant::now();
            let job = self.retry.with_retry(&mut unit).await?;
            self.progress.table_exported(
                database,
                &TableReport {
                    table: job.table.clone(),
                    bytes: job.bytes,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            );
            jobs.push(job);
        }
        Ok(jobs)
    }
}

/// What a successfully exported database produced.
#[derive(Debug)]
struct Exported {
    tables: usize,
    bytes: u64,
    archive: PathBuf,
}

struct EnumerateDatabases<'a> {
    filter: &'a NameFilter,
}

#[async_trait]
impl<'a> RetryableUnit for EnumerateDatabases<'a> {
    type Output = Vec<String>;

    fn describe(&self) -> String {
        "database enumeration".to_string()
    }

    async fn run(&mut self, session: &mut ExportSession) -> Result<Vec<String>> {
        session.enumerate_objects(self.filter).await
    }
}

struct ListTables<'a> {
    database: &'a str,
}

#[async_trait]
impl<'a> RetryableUnit for ListTables<'a> {
    type Output = Vec<String>;

    fn describe(&self) -> String {
        format!("table list of `{}`", self.database)
    }

    async fn run(&mut self, session: &mut ExportSession) -> Result<Vec<String>> {
        session.list_tables(self.database).await
    }
}

struct CountEngineTables<'a> {
    database: &'a str,
    engine: &'a str,
}

#[async_trait]
impl<'a> RetryableUnit for CountEngineTables<'a> {
    type Output = u64;

    fn describe(&self) -> String {
        format!("engine check of `{}`", self.database)
    }

    async fn run(&mut self, session: &mut ExportSession) -> Result<u64> {
        session.count_engine_tables(self.database, self.engine).await
    }
}

/// The export of one table, redone from its start on reconnect.
struct TableExport<'a> {
    database: &'a str,
    table: &'a str,
    tables: &'a [String],
    engine_override: Option<&'a str>,
    staging: &'a StagingArea,
    row_format: RowFormat,
}

impl TableExport<'_> {
    fn row_file(&self) -> PathBuf {
        self.staging.row_file(self.table, self.row_format)
    }

    fn discard_partial(&self, path: &Path) -> Result<()> {
        self.staging.discard(path)
    }
}

#[async_trait]
impl<'a> RetryableUnit for TableExport<'a> {
    type Output = ExportJob;

    fn describe(&self) -> String {
        format!("export of `{}`.`{}`", self.database, self.table)
    }

    async fn run(&mut self, session: &mut ExportSession) -> Result<ExportJob> {
        session.begin_batch(self.database, self.tables).await?;

        let definition = session.fetch_definition(self.database, self.table).await?;
        let split = split(&definition.text, self.engine_override).map_err(|source| {
            Error::MalformedDefinition {
                table: self.table.to_string(),
                source,
            }
        })?;

        let row_file = self.row_file();
        self.discard_partial(&row_file)?;
        let started = Instant::now();
        let bytes = session
            .export_rows(
                self.database,
                self.table,
                &row_file,
                split.primary_key_reference().as_deref(),
            )
            .await?;
        debug!(
            database = self.database,
            table = self.table,
            bytes,
            duration_ms = started.elapsed().as_millis() as u64,
            unsorted = split.unsorted_load,
            "table rows written"
        );

        Ok(ExportJob {
            table: self.table.to_string(),
            split,
            row_file,
            bytes,
        })
    }
}
