//! Per-database staging area under the secure export root.
//!
//! Row files land in `<secure_root>/<db>/` and instruction files next to
//! it as `<secure_root>/<db>.*sql`. Both are cleared before and after each
//! database so nothing stale reaches the next archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::assemble::InstructionFile;
use crate::error::Result;
use crate::session::RowFormat;

/// The staging files of one database.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
    database: String,
    owner: Option<(u32, u32)>,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, database: impl Into<String>, owner: Option<(u32, u32)>) -> Self {
        Self {
            root: root.into(),
            database: database.into(),
            owner,
        }
    }

    /// The secure export root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the server writes row files into.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.database)
    }

    /// Row file of one table.
    pub fn row_file(&self, table: &str, format: RowFormat) -> PathBuf {
        self.data_dir()
            .join(format!("{}.{}", table, format.extension()))
    }

    /// Clear leftovers and create an empty data directory.
    pub fn prepare(&self) -> Result<()> {
        self.clear()?;
        let dir = self.data_dir();
        fs::create_dir_all(&dir)?;
        if let Some((uid, gid)) = self.owner {
            chown(&dir, uid, gid)?;
        }
        Ok(())
    }

    /// Remove the data directory and every instruction file of the database.
    pub fn clear(&self) -> Result<()> {
        let dir = self.data_dir();
        if dir.exists() {
            debug!(path = %dir.display(), "removing staging directory");
            fs::remove_dir_all(&dir)?;
        }
        if !self.root.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file() && self.owns_instruction_file(&name.to_string_lossy()) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn owns_instruction_file(&self, name: &str) -> bool {
        name.strip_prefix(self.database.as_str())
            .is_some_and(|rest| rest == ".sql" || (rest.starts_with('.') && rest.ends_with(".sql")))
    }

    /// Remove a partial row file, if present.
    pub fn discard(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write instruction files next to the data directory.
    pub fn write_instructions(&self, files: &[InstructionFile]) -> Result<Vec<PathBuf>> {
        files
            .iter()
            .map(|file| -> Result<PathBuf> {
                let path = self.root.join(&file.name);
                fs::write(&path, &file.contents)?;
                Ok(path)
            })
            .collect()
    }

    /// Archive members relative to the root: the data directory first.
    pub fn members(&self, files: &[InstructionFile]) -> Vec<String> {
        std::iter::once(self.database.clone())
            .chain(files.iter().map(|f| f.name.clone()))
            .collect()
    }
}

#[cfg(unix)]
fn chown(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid))
}

#[cfg(not(unix))]
fn chown(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}
