//! Error types for shelfdump.

use std::path::PathBuf;

use shelfdump_ddl::ParseError;
use thiserror::Error;

use crate::session::{FailureClass, SessionError};

/// Result type alias using shelfdump's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while exporting, assembling, archiving or rotating backups.
#[derive(Debug, Error)]
pub enum Error {
    /// A table definition could not be parsed or split.
    #[error("malformed definition of `{table}`: {source}")]
    MalformedDefinition {
        table: String,
        #[source]
        source: ParseError,
    },

    /// The connection was lost or refused, or a lock wait timed out.
    #[error("transient connectivity failure: {0}")]
    ConnectivityTransient(SessionError),

    /// The server rejected a statement for a reason that will not go away.
    #[error("connectivity failure: {0}")]
    ConnectivityTerminal(SessionError),

    /// The configured account lacks a privilege.
    #[error("permission denied: {0}")]
    PermissionDenied(SessionError),

    /// A database or table disappeared between enumeration and export.
    #[error("object missing: {0}")]
    ObjectMissing(SessionError),

    /// Every attempt of a retryable unit failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<Error> },

    /// The backup root is not an existing directory.
    #[error("backup root {} is not a directory", .0.display())]
    RootNotFound(PathBuf),

    /// The archive command could not be run or exited non-zero.
    #[error("archive command `{command}` failed: {reason}")]
    ArchivalFailed { command: String, reason: String },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A per-database failure with the database name attached.
    #[error("export of `{database}` failed: {source}")]
    Export {
        database: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether re-establishing the session and redoing the unit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConnectivityTransient(_))
    }

    /// Whether this failure stops the run when failures are not ignored.
    ///
    /// A failed archive only loses that database's archive; the remaining
    /// databases and the rotation pass still run.
    pub fn aborts_run(&self) -> bool {
        match self {
            Error::ArchivalFailed { .. } => false,
            Error::Export { source, .. } => source.aborts_run(),
            _ => true,
        }
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err.class {
            FailureClass::Transient => Error::ConnectivityTransient(err),
            FailureClass::Terminal => Error::ConnectivityTerminal(err),
            FailureClass::Permission => Error::PermissionDenied(err),
            FailureClass::Missing => Error::ObjectMissing(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_mapping() {
        assert!(matches!(
            Error::from(SessionError::from_code(2013, "Lost connection")),
            Error::ConnectivityTransient(_)
        ));
        assert!(matches!(
            Error::from(SessionError::from_code(1142, "SELECT command denied")),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(
            Error::from(SessionError::from_code(1146, "Table 'shop.gone' doesn't exist")),
            Error::ObjectMissing(_)
        ));
        assert!(matches!(
            Error::from(SessionError::from_code(1064, "You have an error in your SQL syntax")),
            Error::ConnectivityTerminal(_)
        ));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(Error::from(SessionError::from_code(1205, "Lock wait timeout")).is_retryable());
        assert!(!Error::from(SessionError::from_code(1045, "Access denied")).is_retryable());
        assert!(!Error::config("missing user").is_retryable());
    }

    #[test]
    fn test_archival_failure_does_not_abort_run() {
        let archival = Error::ArchivalFailed {
            command: "tar".into(),
            reason: "exit status 2".into(),
        };
        assert!(!archival.aborts_run());
        let wrapped = Error::Export {
            database: "shop".into(),
            source: Box::new(archival),
        };
        assert!(!wrapped.aborts_run());
        assert!(Error::RootNotFound(PathBuf::from("/nowhere")).aborts_run());
    }

    #[test]
    fn test_display_attaches_database() {
        let err = Error::Export {
            database: "shop".into(),
            source: Box::new(Error::config("bad")),
        };
        assert_eq!(
            err.to_string(),
            "export of `shop` failed: configuration error: bad"
        );
    }
}
