//! Reload instruction files.
//!
//! The assembler turns the exported tables of one database into the SQL
//! scripts that recreate and reload it, grouped as configured:
//!
//! - **combined**: `<db>.sql`, every table's structure, load and deferred
//!   indexes in turn
//! - **phased**: `<db>.structure.sql`, `<db>.load.sql`, `<db>.index.sql`
//!   and `<db>.maintenance.sql`, each run to completion before the next
//! - **per-object**: `<db>.<table>.sql`, each reloadable on its own

use std::path::PathBuf;

use shelfdump_ddl::{quote_identifier, SplitDefinition};

use crate::config::{BackupConfig, Grouping};
use crate::session::{quote_literal, RowFormat};

/// Character set of the recreated database.
pub const DATABASE_CHARSET: &str = "utf8mb4";

/// Collation of the recreated database.
pub const DATABASE_COLLATION: &str = "utf8mb4_unicode_ci";

/// Enables bulk loading for the reload session.
pub const BULK_LOAD_ON: &str = "SET session sql_log_bin=0;\nSET session rocksdb_bulk_load=1;\n";

/// Ends bulk loading, flushing the loaded data.
pub const BULK_LOAD_OFF: &str = "SET session rocksdb_bulk_load=0;\n";

const BANNER_WIDTH: usize = 60;

/// One table's exported rows and split definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub table: String,
    pub split: SplitDefinition,
    /// Row file as the server sees it.
    pub row_file: PathBuf,
    pub bytes: u64,
}

/// A generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFile {
    /// File name relative to the staging root.
    pub name: String,
    pub contents: String,
}

impl InstructionFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Builds instruction files for one database.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactAssembler {
    grouping: Grouping,
    repeat_setup: bool,
    row_format: RowFormat,
}

impl ArtifactAssembler {
    pub fn new(grouping: Grouping, repeat_setup: bool, row_format: RowFormat) -> Self {
        Self {
            grouping,
            repeat_setup,
            row_format,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(config.grouping, config.repeat_setup, config.row_format)
    }

    /// Produce the instruction files for `jobs`, in enumeration order.
    pub fn assemble(&self, database: &str, jobs: &[ExportJob]) -> Vec<InstructionFile> {
        match self.grouping {
            Grouping::Combined => vec![self.combined(database, jobs)],
            Grouping::Phased => self.phased(database, jobs),
            Grouping::PerObject => jobs
                .iter()
                .map(|job| {
                    InstructionFile::new(
                        format!("{}.{}.sql", database, job.table),
                        self.object_script(database, std::slice::from_ref(job), false),
                    )
                })
                .collect(),
        }
    }

    fn combined(&self, database: &str, jobs: &[ExportJob]) -> InstructionFile {
        let contents = if self.repeat_setup {
            jobs.iter()
                .map(|job| self.object_script(database, std::slice::from_ref(job), true))
                .collect()
        } else {
            self.object_script(database, jobs, false)
        };
        InstructionFile::new(format!("{}.sql", database), contents)
    }

    /// Setup, then each job's interleaved block, then bulk-load teardown.
    fn object_script(&self, database: &str, jobs: &[ExportJob], separated: bool) -> String {
        let bulk = jobs.iter().any(|job| job.split.uses_bulk_load());
        let mut out = create_database(database);
        if bulk {
            out.push_str(BULK_LOAD_ON);
        }
        out.push('\n');
        for job in jobs {
            out.push_str(&banner(&job.table));
            out.push_str(&drop_table(&job.table));
            out.push_str(&job.split.structure_block());
            out.push('\n');
            out.push_str(&self.load_statement(job));
            for statement in &job.split.index_statements {
                out.push_str(statement);
                out.push('\n');
            }
            out.push('\n');
        }
        if bulk {
            out.push_str(BULK_LOAD_OFF);
        }
        if separated {
            out.push('\n');
        }
        out
    }

    fn phased(&self, database: &str, jobs: &[ExportJob]) -> Vec<InstructionFile> {
        let mut structure = create_database(database);
        for job in jobs {
            structure.push('\n');
            structure.push_str(&banner(&job.table));
            structure.push_str(&drop_table(&job.table));
            structure.push_str(&job.split.structure_block());
            structure.push('\n');
        }

        let bulk = jobs.iter().any(|job| job.split.uses_bulk_load());
        let mut load = use_database(database);
        if bulk {
            load.push_str(BULK_LOAD_ON);
        }
        for job in jobs {
            load.push_str(&self.load_statement(job));
        }
        if bulk {
            load.push_str(BULK_LOAD_OFF);
        }

        let mut index = use_database(database);
        for statement in jobs.iter().flat_map(|job| &job.split.index_statements) {
            index.push_str(statement);
            index.push('\n');
        }

        let mut maintenance = use_database(database);
        for job in jobs {
            maintenance.push_str(&format!("ANALYZE TABLE {};\n", quote_identifier(&job.table)));
        }

        vec![
            InstructionFile::new(format!("{}.structure.sql", database), structure),
            InstructionFile::new(format!("{}.load.sql", database), load),
            InstructionFile::new(format!("{}.index.sql", database), index),
            InstructionFile::new(format!("{}.maintenance.sql", database), maintenance),
        ]
    }

    /// `LOAD DATA INFILE`, reading with the table's original charset.
    fn load_statement(&self, job: &ExportJob) -> String {
        let mut statement = format!(
            "LOAD DATA INFILE {} INTO TABLE {}",
            quote_literal(&job.row_file.to_string_lossy()),
            quote_identifier(&job.table)
        );
        if let Some(charset) = &job.split.charset {
            statement.push_str(" CHARACTER SET ");
            statement.push_str(charset);
        }
        if let Some(terminators) = self.row_format.terminators() {
            statement.push(' ');
            statement.push_str(terminators);
        }
        statement.push_str(";\n");
        statement
    }
}

fn use_database(database: &str) -> String {
    format!("USE {};\n", quote_identifier(database))
}

fn create_database(database: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {};\n{}",
        quote_identifier(database),
        DATABASE_CHARSET,
        DATABASE_COLLATION,
        use_database(database)
    )
}

fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};\n", quote_identifier(table))
}

fn banner(table: &str) -> String {
    format!("-- {:#^width$}\n", format!(" {} ", table), width = BANNER_WIDTH)
}
