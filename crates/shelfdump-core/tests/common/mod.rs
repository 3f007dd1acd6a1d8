//! In-memory stand-ins for the database server and the archiver.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shelfdump_core::{Archiver, Connector, Error, Row, SessionError, SqlConnection};

/// A table the fake server serves.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub definition: String,
    pub rows: String,
}

#[derive(Debug, Default)]
struct ServerState {
    secure_root: String,
    databases: BTreeMap<String, Vec<FakeTable>>,
    order: Vec<String>,
    statements: Vec<String>,
    connections: u32,
    refusals: u32,
    failures: Vec<(String, VecDeque<SessionError>)>,
}

/// A scripted server shared by every connection it hands out.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new(secure_root: &Path) -> Self {
        let server = Self::default();
        server.state.lock().unwrap().secure_root = secure_root.to_string_lossy().into_owned();
        server
    }

    pub fn database(&self, name: &str, tables: Vec<FakeTable>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.order.push(name.to_string());
        state.databases.insert(name.to_string(), tables);
        self
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_connections(&self, count: u32) -> &Self {
        self.state.lock().unwrap().refusals = count;
        self
    }

    /// Fail the next statement containing `needle` with `error`.
    pub fn fail_once(&self, needle: &str, error: SessionError) -> &Self {
        let mut state = self.state.lock().unwrap();
        match state.failures.iter_mut().find(|(n, _)| n == needle) {
            Some((_, queue)) => queue.push_back(error),
            None => state
                .failures
                .push((needle.to_string(), VecDeque::from([error]))),
        }
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn count_statements(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn connections(&self) -> u32 {
        self.state.lock().unwrap().connections
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
        }
    }

    fn respond(&self, sql: &str) -> Result<Vec<Row>, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        for (needle, queue) in state.failures.iter_mut() {
            if sql.contains(needle.as_str()) {
                if let Some(err) = queue.pop_front() {
                    return Err(err);
                }
            }
        }

        let idents = backticked(sql);
        if sql.starts_with("SET SESSION wait_timeout")
            || sql.starts_with("START TRANSACTION")
            || sql == "COMMIT"
            || sql.starts_with("LOCK TABLES")
            || sql == "UNLOCK TABLES"
        {
            return Ok(vec![]);
        }
        if sql == "SHOW VARIABLES LIKE 'secure_file_priv'" {
            return Ok(vec![row(&["secure_file_priv", &state.secure_root])]);
        }
        if sql == "SHOW DATABASES" {
            return Ok(state.order.iter().map(|d| row(&[d])).collect());
        }
        if sql.starts_with("SHOW FULL TABLES FROM") {
            let tables = lookup_database(&state, &idents[0])?;
            return Ok(tables.iter().map(|t| row(&[&t.name, "BASE TABLE"])).collect());
        }
        if sql.starts_with("SELECT COUNT(*) FROM information_schema.TABLES") {
            let database = quoted(sql, 0);
            let engine = quoted(sql, 1);
            let count = state
                .databases
                .get(&database)
                .map(|tables| {
                    tables
                        .iter()
                        .filter(|t| t.definition.contains(&format!("ENGINE={}", engine)))
                        .count()
                })
                .unwrap_or(0);
            return Ok(vec![row(&[&count.to_string()])]);
        }
        if sql.starts_with("SHOW CREATE TABLE") {
            let table = lookup_table(&state, &idents[0], &idents[1])?;
            return Ok(vec![row(&[&table.name, &table.definition])]);
        }
        if sql.starts_with("SELECT * INTO OUTFILE") {
            let path = quoted(sql, 0);
            let source = backticked(&sql[sql.find(" FROM ").unwrap()..]);
            let table = lookup_table(&state, &source[0], &source[1])?;
            fs::write(&path, &table.rows)
                .map_err(|e| SessionError::from_code(1, format!("can't create {}: {}", path, e)))?;
            return Ok(vec![]);
        }
        Err(SessionError::from_code(1064, format!("unexpected statement: {}", sql)))
    }
}

fn lookup_database<'s>(state: &'s ServerState, database: &str) -> Result<&'s Vec<FakeTable>, SessionError> {
    state
        .databases
        .get(database)
        .ok_or_else(|| SessionError::from_code(1049, format!("Unknown database '{}'", database)))
}

fn lookup_table<'s>(
    state: &'s ServerState,
    database: &str,
    table: &str,
) -> Result<&'s FakeTable, SessionError> {
    lookup_database(state, database)?
        .iter()
        .find(|t| t.name == table)
        .ok_or_else(|| {
            SessionError::from_code(1146, format!("Table '{}.{}' doesn't exist", database, table))
        })
}

fn row(values: &[&str]) -> Row {
    values.iter().map(|v| Some(v.to_string())).collect()
}

/// Every backtick-quoted identifier, in order.
fn backticked(sql: &str) -> Vec<String> {
    sql.split('`').skip(1).step_by(2).map(str::to_string).collect()
}

/// The `index`-th single-quoted literal.
fn quoted(sql: &str, index: usize) -> String {
    sql.split('\'').skip(1).step_by(2).nth(index).unwrap_or_default().to_string()
}

pub struct FakeConnector {
    server: FakeServer,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, SessionError> {
        let mut state = self.server.state.lock().unwrap();
        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(SessionError::from_code(2003, "Can't connect to MySQL server"));
        }
        state.connections += 1;
        Ok(Box::new(FakeConnection {
            server: self.server.clone(),
            closed: false,
        }))
    }
}

struct FakeConnection {
    server: FakeServer,
    closed: bool,
}

#[async_trait]
impl SqlConnection for FakeConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, SessionError> {
        if self.closed {
            return Err(SessionError::from_code(2006, "MySQL server has gone away"));
        }
        self.server.respond(sql)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SessionError> {
        self.query(sql).await.map(|rows| rows.len() as u64)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// One recorded archive call.
#[derive(Debug, Clone)]
pub struct ArchiveCall {
    pub destination: PathBuf,
    pub source_dir: PathBuf,
    pub members: Vec<String>,
    /// Contents of every member that was a file, at archive time.
    pub files: BTreeMap<String, String>,
    /// Files inside member directories, relative to the source directory.
    pub data_files: Vec<String>,
}

/// Records calls instead of running tar; can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingArchiver {
    calls: Mutex<Vec<ArchiveCall>>,
    fail_for: Option<String>,
}

impl RecordingArchiver {
    pub fn failing_for(database: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_for: Some(format!("{}.tgz", database)),
        }
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn archive(&self, destination: &Path, source_dir: &Path, members: &[String]) -> shelfdump_core::Result<()> {
        let mut files = BTreeMap::new();
        let mut data_files = Vec::new();
        for member in members {
            let path = source_dir.join(member);
            if path.is_file() {
                files.insert(member.clone(), fs::read_to_string(&path)?);
            } else if path.is_dir() {
                for entry in fs::read_dir(&path)? {
                    data_files.push(format!("{}/{}", member, entry?.file_name().to_string_lossy()));
                }
            }
        }
        data_files.sort();
        self.calls.lock().unwrap().push(ArchiveCall {
            destination: destination.to_path_buf(),
            source_dir: source_dir.to_path_buf(),
            members: members.to_vec(),
            files,
            data_files,
        });

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_for.as_deref() == Some(name.as_str()) {
            return Err(Error::ArchivalFailed {
                command: format!("tar -chzf {}", destination.display()),
                reason: "exit status: 2".to_string(),
            });
        }
        fs::write(destination, b"archive")?;
        Ok(())
    }
}

/// `CREATE TABLE` text of a table with a primary key.
pub fn users_definition() -> String {
    "CREATE TABLE `users` (
  `id` int NOT NULL AUTO_INCREMENT,
  `email` varchar(191) NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB AUTO_INCREMENT=42 DEFAULT CHARSET=utf8mb4"
        .to_string()
}

/// A key-partitioned table without primary key or auto-increment column.
pub fn logs_definition() -> String {
    "CREATE TABLE `logs` (
  `at` datetime NOT NULL,
  `line` text,
  KEY `idx_at` (`at`)
) ENGINE=InnoDB DEFAULT CHARSET=latin1
/*!50100 PARTITION BY KEY (`at`)
PARTITIONS 4 */"
        .to_string()
}

pub fn table(name: &str, definition: String, rows: &str) -> FakeTable {
    FakeTable {
        name: name.to_string(),
        definition,
        rows: rows.to_string(),
    }
}
