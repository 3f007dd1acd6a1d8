//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use shelfdump_core::{BackupConfig, Grouping, Isolation, RowFormat};
use shelfdump_ddl::BULK_LOAD_ENGINE;

use crate::output::SummaryFormat;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".config/shelfdump.toml";

/// Export, archive and rotate MySQL backups
#[derive(Parser, Debug)]
#[command(name = "shelfdump")]
#[command(version, about = "Export, archive and rotate MySQL backups", long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.config/shelfdump.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Export exactly these databases, in this order.
    #[arg(short, long, value_delimiter = ',')]
    pub databases: Vec<String>,

    /// Append log output to this file instead of stderr.
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Rewrite every table to this storage engine.
    #[arg(short, long, conflicts_with = "rocksdb")]
    pub engine: Option<String>,

    /// Shorthand for `--engine ROCKSDB`.
    #[arg(long)]
    pub rocksdb: bool,

    /// Export rows as CSV instead of the native format.
    #[arg(long)]
    pub csv: bool,

    /// Hold read locks instead of a consistent snapshot.
    #[arg(long)]
    pub lock: bool,

    /// Log every statement and command.
    #[arg(long)]
    pub debug: bool,

    /// Instruction file grouping: combined, phased or per-object.
    #[arg(short, long)]
    pub grouping: Option<Grouping>,

    /// Repeat database and session setup before every table.
    #[arg(long)]
    pub repeat_setup: bool,

    /// Keep going after a database fails.
    #[arg(long)]
    pub ignore_failures: bool,

    /// Summary output format.
    #[arg(long, default_value = "text", value_enum)]
    pub format: SummaryFormat,

    /// Skip the rotation pass.
    #[arg(long)]
    pub no_rotate: bool,
}

impl Args {
    /// The configuration file to read, if any can be located.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE)))
    }

    /// Default log filter directive.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "shelfdump=debug"
        } else {
            "shelfdump=info"
        }
    }

    /// Layer the command-line overrides on top of the file configuration.
    pub fn apply(&self, mut config: BackupConfig) -> BackupConfig {
        if !self.databases.is_empty() {
            config = config.with_databases(self.databases.clone());
        }
        if self.rocksdb {
            config = config.with_engine_override(BULK_LOAD_ENGINE);
        } else if let Some(engine) = &self.engine {
            config = config.with_engine_override(engine.clone());
        }
        if self.csv {
            config = config.with_row_format(RowFormat::Csv);
        }
        if self.lock {
            config = config.with_isolation(Isolation::Lock);
        }
        if let Some(grouping) = self.grouping {
            config = config.with_grouping(grouping);
        }
        if self.repeat_setup {
            config = config.with_repeat_setup(true);
        }
        if self.ignore_failures {
            config = config.with_ignore_failures(true);
        }
        if self.no_rotate {
            config = config.with_rotate(false);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdump_core::ConnectionConfig;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("shelfdump").chain(argv.iter().copied())).unwrap()
    }

    fn base() -> BackupConfig {
        BackupConfig::new(ConnectionConfig::socket("backup", "/tmp/mysql.sock"))
    }

    #[test]
    fn test_no_flags_leave_config_untouched() {
        let args = parse(&[]);
        let config = args.apply(base());
        assert!(config.databases.is_none());
        assert!(config.engine_override.is_none());
        assert_eq!(config.grouping, Grouping::Combined);
        assert_eq!(config.isolation, Isolation::Snapshot);
        assert_eq!(config.row_format, RowFormat::Native);
        assert!(config.rotate);
        assert!(!config.ignore_failures);
        assert_eq!(args.format, SummaryFormat::Text);
        assert_eq!(args.log_directive(), "shelfdump=info");
    }

    #[test]
    fn test_database_list_keeps_order() {
        let args = parse(&["--databases", "crm,shop", "-d", "audit"]);
        let config = args.apply(base());
        assert_eq!(
            config.databases,
            Some(vec!["crm".to_string(), "shop".to_string(), "audit".to_string()])
        );
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--rocksdb",
            "--csv",
            "--lock",
            "--grouping",
            "fast",
            "--repeat-setup",
            "--ignore-failures",
            "--no-rotate",
            "--format",
            "json",
            "--debug",
        ]);
        let config = args.apply(base());
        assert_eq!(config.engine_override.as_deref(), Some("ROCKSDB"));
        assert_eq!(config.row_format, RowFormat::Csv);
        assert_eq!(config.isolation, Isolation::Lock);
        assert_eq!(config.grouping, Grouping::Phased);
        assert!(config.repeat_setup);
        assert!(config.ignore_failures);
        assert!(!config.rotate);
        assert_eq!(args.format, SummaryFormat::Json);
        assert_eq!(args.log_directive(), "shelfdump=debug");
    }

    #[test]
    fn test_engine_and_rocksdb_conflict() {
        let result = Args::try_parse_from(["shelfdump", "--engine", "InnoDB", "--rocksdb"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_grouping_is_rejected() {
        assert!(Args::try_parse_from(["shelfdump", "--grouping", "sideways"]).is_err());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args = parse(&["--config", "/etc/shelfdump.toml"]);
        assert_eq!(args.config_path(), Some(PathBuf::from("/etc/shelfdump.toml")));
    }
}
