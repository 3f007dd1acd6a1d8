//! Splitting a table definition into separately orderable fragments.
//!
//! Bulk loading is fastest against a bare table, so a definition is broken
//! into the core structure (columns, primary key, constraints), a list of
//! `ALTER TABLE ... ADD KEY` statements to run after the load, and the
//! primary key column list used to export rows in key order.

use crate::ast::{TableDefinition, TableItem};
use crate::error::ParseError;
use crate::parser::parse;

/// The storage engine that needs ordered bulk inserts.
pub const BULK_LOAD_ENGINE: &str = "ROCKSDB";

/// Session toggle that lets the bulk-load engine accept unsorted rows.
pub const ALLOW_UNSORTED_ON: &str = "SET session rocksdb_bulk_load_allow_unsorted=1;";

/// Restores ordered bulk loading.
pub const ALLOW_UNSORTED_OFF: &str = "SET session rocksdb_bulk_load_allow_unsorted=0;";

/// Whether bulk loads into `engine` must arrive in primary-key order.
pub fn requires_ordered_bulk_load(engine: &str) -> bool {
    engine.eq_ignore_ascii_case(BULK_LOAD_ENGINE)
}

/// Quote an identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// A definition split for deferred index creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDefinition {
    /// Table name, unquoted.
    pub table: String,
    /// `CREATE TABLE` without secondary indexes, no trailing semicolon.
    ///
    /// When `unsorted_load` is set the indexes are inlined here instead.
    pub core_structure: String,
    /// `ALTER TABLE ... ADD ...;` statements, in declaration order.
    pub index_statements: Vec<String>,
    /// Primary key columns; empty when none is declared or derivable.
    pub primary_key: Vec<String>,
    /// The table cannot be loaded in key order and needs the unsorted toggle.
    pub unsorted_load: bool,
    /// Effective storage engine after any override.
    pub engine: String,
    /// Default character set of the original definition.
    pub charset: Option<String>,
}

impl SplitDefinition {
    /// Quoted, comma-separated primary key columns for `ORDER BY`.
    pub fn primary_key_reference(&self) -> Option<String> {
        if self.primary_key.is_empty() {
            return None;
        }
        let columns: Vec<String> = self.primary_key.iter().map(|c| quote_identifier(c)).collect();
        Some(columns.join(","))
    }

    /// The core structure as a terminated statement.
    pub fn structure_statement(&self) -> String {
        format!("{};", self.core_structure)
    }

    /// The structure as it appears in an interleaved reload script.
    ///
    /// Unsorted tables get the create statement bracketed by the
    /// allow-unsorted session toggles.
    pub fn structure_block(&self) -> String {
        if self.unsorted_load {
            format!(
                "{}\n{}\n{}",
                ALLOW_UNSORTED_ON,
                self.structure_statement(),
                ALLOW_UNSORTED_OFF
            )
        } else {
            self.structure_statement()
        }
    }

    /// Whether reloading this table should run in a bulk-load session.
    pub fn uses_bulk_load(&self) -> bool {
        requires_ordered_bulk_load(&self.engine)
    }
}

/// Parse and split a definition.
///
/// `engine_override` replaces the `ENGINE=` option. Fails when the name,
/// the column block or the engine clause cannot be located.
pub fn split(source: &str, engine_override: Option<&str>) -> Result<SplitDefinition, ParseError> {
    let definition = parse(source)?;
    split_definition(&definition, engine_override)
}

/// Split an already parsed definition.
pub fn split_definition(
    definition: &TableDefinition,
    engine_override: Option<&str>,
) -> Result<SplitDefinition, ParseError> {
    let Some(source_engine) = definition.engine() else {
        let span = definition
            .options
            .last()
            .map(|opt| opt.span)
            .unwrap_or(definition.span);
        return Err(ParseError::new("table options carry no ENGINE clause", span)
            .with_hint("pass the output of SHOW CREATE TABLE unchanged"));
    };
    let engine = engine_override.unwrap_or(source_engine).to_string();

    let (fields, indexes): (Vec<&TableItem>, Vec<&TableItem>) = definition
        .items
        .iter()
        .partition(|item| !item.kind.is_secondary_index());

    let mut field_texts: Vec<String> = fields.iter().map(|item| item.text.clone()).collect();
    let mut primary_key = definition
        .primary_key()
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    let mut unsorted_load = false;

    if primary_key.is_empty()
        && definition.is_key_partitioned()
        && requires_ordered_bulk_load(&engine)
    {
        match definition.auto_increment_columns().as_slice() {
            [column] => {
                field_texts.push(format!("PRIMARY KEY ({})", quote_identifier(column)));
                primary_key.push(column.to_string());
            }
            _ => unsorted_load = true,
        }
    }

    let table = quote_identifier(&definition.name.value);
    let index_statements = if unsorted_load {
        field_texts.extend(indexes.iter().map(|item| item.text.clone()));
        Vec::new()
    } else {
        indexes
            .iter()
            .map(|item| format!("ALTER TABLE {} ADD {};", table, item.text))
            .collect()
    };

    let mut core_structure = format!(
        "CREATE TABLE {} (\n  {}\n) {}",
        table,
        field_texts.join(",\n  "),
        render_options(definition, &engine)
    );
    if let Some(annotation) = &definition.annotation {
        core_structure.push('\n');
        core_structure.push_str(annotation);
    }

    Ok(SplitDefinition {
        table: definition.name.value.clone(),
        core_structure,
        index_statements,
        primary_key,
        unsorted_load,
        engine,
        charset: definition.charset().map(str::to_string),
    })
}

/// Re-render the table options with the engine replaced and the volatile
/// `AUTO_INCREMENT` counter dropped.
fn render_options(definition: &TableDefinition, engine: &str) -> String {
    definition
        .options
        .iter()
        .filter(|opt| opt.name != "AUTO_INCREMENT")
        .map(|opt| {
            if opt.name == "ENGINE" {
                format!("ENGINE={}", engine)
            } else {
                opt.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const USERS: &str = "CREATE TABLE `users` (
  `id` int NOT NULL AUTO_INCREMENT,
  `email` varchar(191) NOT NULL,
  `team_id` int DEFAULT NULL,
  PRIMARY KEY (`id`),
  UNIQUE KEY `uq_email` (`email`),
  KEY `idx_team` (`team_id`)
) ENGINE=InnoDB AUTO_INCREMENT=311 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

    const LOGS: &str = "CREATE TABLE `logs` (
  `id` bigint NOT NULL AUTO_INCREMENT,
  `level` tinyint NOT NULL,
  `msg` text,
  KEY `idx_id` (`id`),
  KEY `idx_level` (`level`)
) ENGINE=InnoDB AUTO_INCREMENT=9 DEFAULT CHARSET=latin1
/*!50100 PARTITION BY KEY (`id`)
PARTITIONS 4 */";

    const EVENTS: &str = "CREATE TABLE `events` (
  `source` varchar(32) NOT NULL,
  `payload` json DEFAULT NULL,
  KEY `idx_source` (`source`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
/*!50100 PARTITION BY KEY (`source`)
PARTITIONS 8 */";

    #[test]
    fn test_split_defers_secondary_indexes() {
        let split = split(USERS, None).unwrap();
        assert_eq!(
            split.core_structure,
            "CREATE TABLE `users` (
  `id` int NOT NULL AUTO_INCREMENT,
  `email` varchar(191) NOT NULL,
  `team_id` int DEFAULT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
        );
        assert_eq!(
            split.index_statements,
            vec![
                "ALTER TABLE `users` ADD UNIQUE KEY `uq_email` (`email`);".to_string(),
                "ALTER TABLE `users` ADD KEY `idx_team` (`team_id`);".to_string(),
            ]
        );
        assert_eq!(split.primary_key_reference().as_deref(), Some("`id`"));
        assert_eq!(split.charset.as_deref(), Some("utf8mb4"));
        assert!(!split.unsorted_load);
        assert!(!split.uses_bulk_load());
    }

    #[test]
    fn test_split_strips_auto_increment_counter() {
        let split = split(USERS, None).unwrap();
        assert!(!split.core_structure.contains("AUTO_INCREMENT=311"));
        assert!(split.core_structure.contains("`id` int NOT NULL AUTO_INCREMENT"));
    }

    #[test]
    fn test_split_engine_override() {
        let split = split(USERS, Some(BULK_LOAD_ENGINE)).unwrap();
        assert!(split.core_structure.contains(") ENGINE=ROCKSDB DEFAULT CHARSET"));
        assert_eq!(split.engine, "ROCKSDB");
        assert!(split.uses_bulk_load());
    }

    #[test]
    fn test_split_synthesizes_primary_key_from_single_auto_increment() {
        let split = split(LOGS, Some(BULK_LOAD_ENGINE)).unwrap();
        assert_eq!(split.primary_key, vec!["id".to_string()]);
        assert!(!split.unsorted_load);
        assert!(split
            .core_structure
            .contains("  `msg` text,\n  PRIMARY KEY (`id`)\n) ENGINE=ROCKSDB"));
        assert!(split
            .core_structure
            .ends_with("/*!50100 PARTITION BY KEY (`id`)\nPARTITIONS 4 */"));
        assert_eq!(split.index_statements.len(), 2);
    }

    #[test]
    fn test_split_unsorted_fallback_without_auto_increment() {
        let split = split(EVENTS, Some(BULK_LOAD_ENGINE)).unwrap();
        assert!(split.unsorted_load);
        assert!(split.primary_key.is_empty());
        assert!(split.index_statements.is_empty());
        assert_eq!(
            split.structure_block(),
            "SET session rocksdb_bulk_load_allow_unsorted=1;
CREATE TABLE `events` (
  `source` varchar(32) NOT NULL,
  `payload` json DEFAULT NULL,
  KEY `idx_source` (`source`)
) ENGINE=ROCKSDB DEFAULT CHARSET=utf8mb4
/*!50100 PARTITION BY KEY (`source`)
PARTITIONS 8 */;
SET session rocksdb_bulk_load_allow_unsorted=0;"
        );
    }

    #[test]
    fn test_split_partition_rule_needs_ordered_engine() {
        let split = split(EVENTS, None).unwrap();
        assert!(!split.unsorted_load);
        assert_eq!(split.index_statements.len(), 1);
    }

    #[test]
    fn test_split_rejects_missing_engine() {
        let err = split("CREATE TABLE `t` (`id` int) ROW_FORMAT=DYNAMIC", None).unwrap_err();
        assert_eq!(err.message, "table options carry no ENGINE clause");
    }

    #[test]
    fn test_split_keeps_tablespace_comment_before_engine() {
        let split = split(
            "CREATE TABLE `t` (
  `id` int NOT NULL,
  PRIMARY KEY (`id`)
) /*!50100 TABLESPACE `ts` */ ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            Some(BULK_LOAD_ENGINE),
        )
        .unwrap();
        assert_eq!(split.engine, "ROCKSDB");
        assert_eq!(
            split.core_structure,
            "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) \
             /*!50100 TABLESPACE `ts` */ ENGINE=ROCKSDB DEFAULT CHARSET=utf8mb4"
        );
    }

    #[test]
    fn test_split_rejects_garbage() {
        assert!(split("not a table", None).is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("plain"), "`plain`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}
