//! MySQL connections over `sqlx`.
//!
//! Statements go through the text protocol (`raw_sql`), so every column
//! arrives as its textual representation and is decoded as bytes.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Connection, Executor as _, Row as _};
use tracing::debug;

use super::{Connector, Row, SessionError, SqlConnection};
use crate::config::{ConnectionConfig, Endpoint};

/// Opens MySQL connections from the `[client]` settings.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: ConnectionConfig,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().username(&self.config.user);
        if let Some(password) = &self.config.password {
            options = options.password(password);
        }
        match &self.config.endpoint {
            Endpoint::Socket(path) => options.socket(path),
            Endpoint::Tcp { host, port } => options.host(host).port(*port),
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, SessionError> {
        debug!(settings = %self.config, "connecting");
        let conn = MySqlConnection::connect_with(&self.options())
            .await
            .map_err(session_error)?;
        Ok(Box::new(MySqlSessionConnection { conn: Some(conn) }))
    }
}

struct MySqlSessionConnection {
    conn: Option<MySqlConnection>,
}

impl MySqlSessionConnection {
    fn live(&mut self) -> Result<&mut MySqlConnection, SessionError> {
        self.conn
            .as_mut()
            .ok_or_else(|| SessionError::transient("connection already closed"))
    }
}

#[async_trait]
impl SqlConnection for MySqlSessionConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, SessionError> {
        let conn = self.live()?;
        let rows = conn
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(session_error)?;
        rows.iter().map(text_row).collect()
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SessionError> {
        let conn = self.live()?;
        let result = conn
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(session_error)?;
        Ok(result.rows_affected())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "connection close failed");
            }
        }
    }
}

fn text_row(row: &MySqlRow) -> Result<Row, SessionError> {
    (0..row.len())
        .map(|i| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(i)
                .map(|value| value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                .map_err(session_error)
        })
        .collect()
}

/// Map a driver error onto the failure classes.
fn session_error(err: sqlx::Error) -> SessionError {
    match &err {
        sqlx::Error::Database(db) => match db.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql) => SessionError::from_code(mysql.number(), mysql.message()),
            None => SessionError::terminal(err.to_string()),
        },
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed => {
            SessionError::transient(err.to_string())
        }
        _ => SessionError::terminal(err.to_string()),
    }
}
