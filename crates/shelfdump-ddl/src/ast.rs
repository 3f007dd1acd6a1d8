//! Syntax tree for a parsed `CREATE TABLE` definition.

use crate::span::{Span, Spanned};

/// Option names that carry the table's default character set.
const CHARSET_OPTIONS: &[&str] = &[
    "DEFAULT CHARSET",
    "CHARSET",
    "DEFAULT CHARACTER SET",
    "CHARACTER SET",
];

/// A parsed table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    /// Table name, unquoted.
    pub name: Spanned<String>,
    /// Schema qualifier when the name was written as `db`.`table`.
    pub schema: Option<String>,
    /// Column, key and constraint declarations in source order.
    pub items: Vec<TableItem>,
    /// Table options following the column block, in source order.
    pub options: Vec<TableOption>,
    /// Trailing annotation (partitioning clause, usually a versioned comment).
    pub annotation: Option<String>,
    /// The full span of the statement.
    pub span: Span,
}

/// One top-level declaration inside the column block.
#[derive(Debug, Clone, PartialEq)]
pub struct TableItem {
    /// What the declaration declares.
    pub kind: ItemKind,
    /// The declaration text exactly as written.
    pub text: String,
    /// Span of the declaration.
    pub span: Span,
}

/// Classification of a column-block declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// A column.
    Column {
        /// Column name, unquoted.
        name: String,
        /// Whether the column carries `AUTO_INCREMENT`.
        auto_increment: bool,
    },
    /// `PRIMARY KEY (...)`.
    PrimaryKey {
        /// Referenced column names, without prefix lengths or sort order.
        columns: Vec<String>,
    },
    /// `KEY ...` or `INDEX ...`.
    Index,
    /// `UNIQUE KEY ...`.
    Unique,
    /// `FULLTEXT` or `SPATIAL` keys.
    OtherKey,
    /// `CONSTRAINT ... FOREIGN KEY`, `CHECK (...)` and similar.
    Constraint,
}

impl ItemKind {
    /// Secondary indexes can be created after the data load.
    pub fn is_secondary_index(&self) -> bool {
        matches!(self, ItemKind::Index | ItemKind::Unique)
    }
}

/// A `NAME=value` table option.
///
/// A comment sitting between options (`/*!50100 TABLESPACE ... */`) is
/// kept in place as an option with an empty name.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOption {
    /// Option name, upper-cased with single spaces (`DEFAULT CHARSET`).
    pub name: String,
    /// Value text as written (quotes kept for string values).
    pub value: String,
    /// The whole option text as written.
    pub text: String,
    /// Span of the option.
    pub span: Span,
}

impl TableDefinition {
    /// Look up a table option by its normalized name.
    pub fn option(&self, name: &str) -> Option<&TableOption> {
        self.options
            .iter()
            .find(|opt| opt.name.eq_ignore_ascii_case(name))
    }

    /// The storage engine named in the options.
    pub fn engine(&self) -> Option<&str> {
        self.option("ENGINE").map(|opt| opt.value.as_str())
    }

    /// The table's default character set.
    pub fn charset(&self) -> Option<&str> {
        CHARSET_OPTIONS
            .iter()
            .find_map(|name| self.option(name))
            .map(|opt| opt.value.as_str())
    }

    /// The primary key column list, if the definition declares one.
    pub fn primary_key(&self) -> Option<&[String]> {
        self.items.iter().find_map(|item| match &item.kind {
            ItemKind::PrimaryKey { columns } => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// Names of every `AUTO_INCREMENT` column.
    pub fn auto_increment_columns(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match &item.kind {
                ItemKind::Column {
                    name,
                    auto_increment: true,
                } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the annotation declares `PARTITION BY [LINEAR] KEY`.
    pub fn is_key_partitioned(&self) -> bool {
        let Some(annotation) = &self.annotation else {
            return false;
        };
        let words: Vec<String> = annotation
            .split(|c: char| c.is_whitespace() || c == '(')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_ascii_uppercase())
            .collect();

        words
            .windows(3)
            .any(|w| w[0] == "PARTITION" && w[1] == "BY" && w[2] == "KEY")
            || words.windows(4).any(|w| {
                w[0] == "PARTITION" && w[1] == "BY" && w[2] == "LINEAR" && w[3] == "KEY"
            })
    }
}
