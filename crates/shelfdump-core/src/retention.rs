//! Dated backup directories: naming, day reconciliation and rotation.
//!
//! Backups land in `<root>/day<N>` on weekdays and `<root>/<YYYYMMDD>` on
//! Sundays. Once a `day<N>` directory is stale it is renamed after the date
//! of its last modification, which moves it into the rotation pool.
//!
//! Rotation and reconciliation read dates from different sources: rotation
//! buckets by the weekday of the date in the directory *name*, while
//! reconciliation compares the directory's *modification* date with today.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, Weekday};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Rotation budgets per weekday class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionBudget {
    pub weekday_keep: usize,
    pub sunday_keep: usize,
}

impl RetentionBudget {
    pub fn new(weekday_keep: usize, sunday_keep: usize) -> Self {
        Self {
            weekday_keep,
            sunday_keep,
        }
    }
}

/// Which budget a dated directory counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Sunday,
    Weekday,
}

impl DayClass {
    pub fn of(date: NaiveDate) -> Self {
        if date.weekday() == Weekday::Sun {
            DayClass::Sunday
        } else {
            DayClass::Weekday
        }
    }
}

/// Outcome of a rotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub removed: Vec<PathBuf>,
    pub kept_weekdays: usize,
    pub kept_sundays: usize,
}

/// Parse an exactly-eight-digit `YYYYMMDD` directory name.
pub fn parse_backup_date(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = name[0..4].parse().ok()?;
    let month = name[4..6].parse().ok()?;
    let day = name[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Name of the directory that receives `today`'s archives.
pub fn active_directory_name(today: NaiveDate) -> String {
    match today.weekday() {
        Weekday::Sun => today.format("%Y%m%d").to_string(),
        weekday => format!("day{}", weekday.number_from_monday()),
    }
}

/// Local calendar date of a modification time.
fn local_date(time: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(time).date_naive()
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Rotation and reconciliation under one backup root.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    root: PathBuf,
    budget: RetentionBudget,
}

impl RetentionManager {
    pub fn new(root: impl Into<PathBuf>, budget: RetentionBudget) -> Self {
        Self {
            root: root.into(),
            budget,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_root(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::RootNotFound(self.root.clone()))
        }
    }

    /// Delete the oldest dated directories beyond each class's budget.
    ///
    /// Only directories named by a valid `YYYYMMDD` date take part; anything
    /// else under the root is left alone.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn rotate(&self) -> Result<RotationReport> {
        self.check_root()?;

        let mut sundays = Vec::new();
        let mut weekdays = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(parse_backup_date) else {
                continue;
            };
            let mtime = entry.metadata()?.modified()?;
            let dated = (mtime, entry.path());
            match DayClass::of(date) {
                DayClass::Sunday => sundays.push(dated),
                DayClass::Weekday => weekdays.push(dated),
            }
        }

        let mut removed = Vec::new();
        let kept_weekdays = remove_oldest(weekdays, self.budget.weekday_keep, &mut removed)?;
        let kept_sundays = remove_oldest(sundays, self.budget.sunday_keep, &mut removed)?;
        let report = RotationReport {
            removed,
            kept_weekdays,
            kept_sundays,
        };
        info!(
            removed = report.removed.len(),
            kept_weekdays = report.kept_weekdays,
            kept_sundays = report.kept_sundays,
            "rotation complete"
        );
        Ok(report)
    }

    /// Make sure the directory for `today` exists and is not a stale one.
    ///
    /// When the active directory was last modified on an earlier day it is
    /// moved to `<root>/<mtime YYYYMMDD>` (merged into it when that exists)
    /// and a fresh active directory is created. A missing root is created
    /// too, so the first run on a host lands its archives.
    pub fn prepare_active_directory(&self, today: NaiveDate) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let active = self.root.join(active_directory_name(today));

        if active.is_dir() {
            let last_modified = local_date(modified(&active)?);
            if last_modified != today {
                let target = self.root.join(last_modified.format("%Y%m%d").to_string());
                if target != active {
                    info!(
                        from = %active.display(),
                        to = %target.display(),
                        "moving stale backup directory"
                    );
                    move_directory(&active, &target)?;
                }
            }
        }

        fs::create_dir_all(&active)?;
        Ok(active)
    }
}

/// Rotate with explicit budgets.
pub fn rotate(root: &Path, weekday_keep: usize, sunday_keep: usize) -> Result<RotationReport> {
    RetentionManager::new(root, RetentionBudget::new(weekday_keep, sunday_keep)).rotate()
}

/// Remove all but the `keep` newest entries, returning how many remain.
fn remove_oldest(
    mut dated: Vec<(SystemTime, PathBuf)>,
    keep: usize,
    removed: &mut Vec<PathBuf>,
) -> Result<usize> {
    dated.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let excess = dated.len().saturating_sub(keep);
    for (_, path) in dated.drain(..excess) {
        debug!(path = %path.display(), "removing backup directory");
        fs::remove_dir_all(&path)?;
        removed.push(path);
    }
    Ok(dated.len())
}

/// Rename `from` to `to`, merging entries into `to` when it already exists.
fn move_directory(from: &Path, to: &Path) -> io::Result<()> {
    if !to.exists() {
        return fs::rename(from, to);
    }
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let destination = to.join(entry.file_name());
        if destination.is_dir() && entry.file_type()?.is_dir() {
            move_directory(&entry.path(), &destination)?;
        } else {
            fs::rename(entry.path(), destination)?;
        }
    }
    fs::remove_dir(from)
}
