//! Age-based deletion of old backups, archives and logs.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};

use function_name::named;
use regex::Regex;
use walkdir::WalkDir;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub static SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<Error>,
}

/// Name patterns of the artifacts belonging to one backup family.
pub fn backup_db_pattern(name: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"^{}_backup_.*\.db$", regex::escape(name)))?)
}

pub fn backup_archive_pattern(name: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"^{}_backup_.*\.7z$", regex::escape(name)))?)
}

pub fn rotated_archive_db_pattern(name: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"^{}_archive_.*\.db$", regex::escape(name)))?)
}

pub fn log_file_pattern() -> Regex {
    Regex::new(r"^backup_.*\.log$").expect("static log file pattern")
}

/// Deletes every file under `dir` whose file name matches `pattern` and whose
/// modification time lies more than `max_age_days` days before `now`.
/// Symlinks are judged by their target; a dangling one is a failed entry.
///
/// Errors on individual entries are logged and collected; the walk carries on.
#[named]
pub fn sweep<P: AsRef<Path>>(
    dir: P,
    max_age_days: u32,
    pattern: &Regex,
    now: SystemTime,
) -> SweepReport {
    let dir = dir.as_ref();
    let max_age = Duration::from_secs(u64::from(max_age_days) * SECONDS_PER_DAY);
    let mut report = SweepReport::default();

    tracing::debug!(
        "Sweeping {:?} for {} older than {} days",
        dir,
        pattern.as_str(),
        max_age_days
    );

    for entry in WalkDir::new(dir) {
        let res = entry
            .map_err(Error::from)
            .and_then(|entry| {
                if entry.file_type().is_dir() {
                    return Ok(None);
                }
                let matches = entry
                    .file_name()
                    .to_str()
                    .map(|file_name| pattern.is_match(file_name))
                    .unwrap_or(false);
                if !matches {
                    tracing::trace!("Skipping {:?}, pattern not match", entry.path());
                    return Ok(None);
                }
                let path = entry.into_path();
                let expired = is_expired(&path, max_age, now)
                    .with_msg(format!("Reading modification time of {:?} failed", path))?;
                if !expired {
                    tracing::trace!("Keeping {:?}, not old enough", path);
                    return Ok(None);
                }
                std::fs::remove_file(&path)
                    .map_err(Error::from)
                    .with_msg(format!("Delete {:?} failed", path))?;
                Ok(Some(path))
            })
            .with_fn_name(function_path!());

        match res {
            Ok(Some(path)) => {
                tracing::info!("Deleted {:?}", path);
                report.deleted.push(path);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping entry during sweep: {e}");
                report.failed.push(e);
            }
        }
    }

    report
}

fn is_expired(path: &Path, max_age: Duration, now: SystemTime) -> Result<bool> {
    let modified = std::fs::metadata(path)?.modified()?;
    // mtime in the future counts as age zero
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    Ok(age > max_age)
}
