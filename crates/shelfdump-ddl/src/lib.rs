//! Table definition splitting for shelfdump.
//!
//! This crate parses the `CREATE TABLE` text returned by `SHOW CREATE TABLE`
//! and splits it into the fragments a fast reload needs, in the order the
//! reload runs them:
//!
//! 1. the core structure (columns, primary key, constraints, table options),
//! 2. the row data, bulk-loaded against the bare table,
//! 3. the deferred secondary indexes (`ALTER TABLE ... ADD KEY ...`).
//!
//! # Usage
//!
//! ```rust
//! use shelfdump_ddl::split;
//!
//! let definition = "CREATE TABLE `users` (
//!   `id` int NOT NULL AUTO_INCREMENT,
//!   `email` varchar(191) NOT NULL,
//!   PRIMARY KEY (`id`),
//!   KEY `idx_email` (`email`)
//! ) ENGINE=InnoDB AUTO_INCREMENT=7 DEFAULT CHARSET=utf8mb4";
//!
//! let split = split(definition, Some("ROCKSDB")).unwrap();
//! assert_eq!(split.index_statements.len(), 1);
//! assert_eq!(split.primary_key_reference().as_deref(), Some("`id`"));
//! assert!(split.core_structure.contains("ENGINE=ROCKSDB"));
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod split;

pub use ast::{ItemKind, TableDefinition, TableItem, TableOption};
pub use error::ParseError;
pub use parser::parse;
pub use span::{Location, Span, Spanned};
pub use split::{
    quote_identifier, requires_ordered_bulk_load, split, split_definition, SplitDefinition,
    ALLOW_UNSORTED_OFF, ALLOW_UNSORTED_ON, BULK_LOAD_ENGINE,
};
