//! Archival of a staged database.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Packs staged files into an archive.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archive `members` (relative to `source_dir`) into `destination`.
    async fn archive(&self, destination: &Path, source_dir: &Path, members: &[String]) -> Result<()>;
}

/// Runs `tar -chzf`, optionally behind a priority-lowering prefix.
#[derive(Debug, Clone, Default)]
pub struct TarArchiver {
    prefix: Vec<String>,
}

impl TarArchiver {
    /// `nice` is a whitespace-separated command prefix such as
    /// `nice -n 15 ionice -c2 -n5`; empty runs tar directly.
    pub fn new(nice: &str) -> Self {
        Self {
            prefix: nice.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// The full argument vector for one archive.
    pub fn command_line(&self, destination: &Path, source_dir: &Path, members: &[String]) -> Vec<String> {
        let mut argv = self.prefix.clone();
        argv.extend([
            "tar".to_string(),
            "-chzf".to_string(),
            destination.to_string_lossy().into_owned(),
            "-C".to_string(),
            source_dir.to_string_lossy().into_owned(),
        ]);
        argv.extend(members.iter().cloned());
        argv
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn archive(&self, destination: &Path, source_dir: &Path, members: &[String]) -> Result<()> {
        let argv = self.command_line(destination, source_dir, members);
        let command = argv.join(" ");
        debug!(command = %command, "running archiver");

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .await
            .map_err(|e| Error::ArchivalFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ArchivalFailed {
                command,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_command_line_with_prefix() {
        let archiver = TarArchiver::new("nice -n 15 ionice -c2 -n5");
        let argv = archiver.command_line(
            &PathBuf::from("/srv/backups/day3/shop.tgz"),
            &PathBuf::from("/home"),
            &["shop".to_string(), "shop.sql".to_string()],
        );
        assert_eq!(
            argv.join(" "),
            "nice -n 15 ionice -c2 -n5 tar -chzf /srv/backups/day3/shop.tgz -C /home shop shop.sql"
        );
    }

    #[test]
    fn test_command_line_without_prefix() {
        let argv = TarArchiver::new("").command_line(
            &PathBuf::from("/b/shop.tgz"),
            &PathBuf::from("/home"),
            &["shop".to_string()],
        );
        assert_eq!(argv[0], "tar");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_is_archival_failure() {
        let dir = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits 1
        let archiver = TarArchiver {
            prefix: vec!["false".to_string()],
        };
        let err = archiver
            .archive(&dir.path().join("x.tgz"), dir.path(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArchivalFailed { .. }));
    }
}
