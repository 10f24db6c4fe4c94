//! Consistent point-in-time copies of live SQLite databases.
//!
//! The live file is first duplicated into the backup directory (the working
//! copy) so the compacting step never touches it, then `VACUUM INTO` (or the
//! online backup API when vacuum is disabled) writes the dated backup.

use crate::backup::artifact::{artifact_path, rename_aside, working_copy_path, ArtifactKind};
use crate::backup::clock::Clock;
use crate::backup::database::DatabaseDescriptor;
use crate::backup::disk::DiskSpace;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;

use function_name::named;
use rusqlite::{Connection, MAIN_DB};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Only used to make sizes readable in the log.
pub static GIB: u64 = 1073741824;
/// Copy, then compact: room for two copies plus working space.
pub static FREE_SPACE_FACTOR: f64 = 2.5;
/// A backup smaller than this share of the live file is suspicious.
pub static MIN_BACKUP_RATIO: f64 = 0.5;

/// How the working copy is obtained from the live file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkingCopyMode {
    /// Plain copy; an existing working copy is reused.
    Copy,
    /// Move the source itself, used for databases that are already archives.
    Move,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveRetry {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for MoveRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub artifact: PathBuf,
    /// Where an earlier backup of the same day was moved to.
    pub renamed_aside: Option<PathBuf>,
    pub db_size: u64,
    pub backup_size: u64,
    pub too_small: bool,
}

pub fn has_enough_space(db_size: u64, free_space: u64) -> bool {
    (db_size as f64) * FREE_SPACE_FACTOR < free_space as f64
}

pub fn is_too_small(backup_size: u64, db_size: u64) -> bool {
    db_size > 0 && (backup_size as f64) / (db_size as f64) < MIN_BACKUP_RATIO
}

pub fn gib(bytes: u64) -> f64 {
    (bytes as f64 / GIB as f64 * 1000.0).round() / 1000.0
}

#[derive(Debug)]
pub struct SnapshotEngine<'a> {
    clock: &'a dyn Clock,
    disk: &'a dyn DiskSpace,
    move_retry: MoveRetry,
}

impl<'a> SnapshotEngine<'a> {
    pub fn new(clock: &'a dyn Clock, disk: &'a dyn DiskSpace, move_retry: MoveRetry) -> Self {
        Self {
            clock,
            disk,
            move_retry,
        }
    }

    /// Writes `{name}_backup_{date}.db` for `descriptor`.
    ///
    /// A failure here only concerns this database; nothing is rolled back
    /// beyond the files this call itself created.
    #[named]
    pub fn snapshot(
        &self,
        descriptor: &DatabaseDescriptor,
        date: &str,
        mode: WorkingCopyMode,
    ) -> Result<SnapshotOutcome> {
        let name = descriptor.name();
        let source = descriptor.source_path();
        let backup_dir = descriptor.backup_dir();

        let db_size = fs::metadata(source)?.len();
        let free_space = self.disk.free_space(backup_dir)?;
        tracing::info!(
            "Database {} weights {} ({} Gb) (Free space is {} ({} Gb))",
            name,
            db_size,
            gib(db_size),
            free_space,
            gib(free_space)
        );

        if !has_enough_space(db_size, free_space) {
            tracing::error!("NOT enough free space for backup of {}!", name);
            return Err(Error::InsufficientDiskSpace {
                needed: ((db_size as f64) * FREE_SPACE_FACTOR).ceil() as u64,
                free: free_space,
            });
        }

        let working_copy = working_copy_path(descriptor);
        tracing::info!("Copy {} from {:?} to {:?}", name, source, working_copy);
        match mode {
            WorkingCopyMode::Move => {
                if !move_with_retry(source, &working_copy, self.move_retry) {
                    tracing::error!("Moving {:?} failed after all attempts", source);
                }
            }
            WorkingCopyMode::Copy if working_copy.exists() => {
                tracing::warn!("Reusing existing working copy {:?}", working_copy);
            }
            WorkingCopyMode::Copy => {
                if let Err(e) = fs::copy(source, &working_copy) {
                    tracing::error!("Copy of {:?} failed: {e}", source);
                    let _ = fs::remove_file(&working_copy);
                }
            }
        }

        if !working_copy.is_file() {
            tracing::error!("Copy is missing!");
            return Err(Error::WorkingCopyMissing(working_copy));
        }

        let destination = artifact_path(descriptor, date, ArtifactKind::Backup);
        let renamed_aside = rename_aside(&destination, self.clock)?;

        tracing::info!("{} backup started", name);
        if let Err(e) = write_snapshot(&working_copy, &destination, descriptor.vacuum_enabled()) {
            self.clean_up_failed_snapshot(source, &working_copy, &destination, renamed_aside, mode);
            return Err(e.with_debug_object_and_fn_name(descriptor.clone(), function_path!()));
        }
        tracing::info!("{} backup ended", name);

        tracing::info!("Deleting of {:?}", working_copy);
        if let Err(e) = fs::remove_file(&working_copy) {
            tracing::warn!("Delete working copy {:?} failed: {e}", working_copy);
        }

        let backup_size = fs::metadata(&destination)?.len();
        tracing::info!(
            "Backup {:?} weights {} ({} Gb)",
            destination,
            backup_size,
            gib(backup_size)
        );

        let too_small = is_too_small(backup_size, db_size);
        if too_small {
            tracing::error!("{} backup is too small!", name);
        } else {
            tracing::info!("{} database is backed up SUCCESSFULLY!", name);
        }

        Ok(SnapshotOutcome {
            artifact: destination,
            renamed_aside,
            db_size,
            backup_size,
            too_small,
        })
    }

    fn clean_up_failed_snapshot(
        &self,
        source: &Path,
        working_copy: &Path,
        destination: &Path,
        renamed_aside: Option<PathBuf>,
        mode: WorkingCopyMode,
    ) {
        if destination.exists() {
            if let Err(e) = fs::remove_file(destination) {
                tracing::warn!("Delete partial backup {:?} failed: {e}", destination);
            }
        }
        if let Some(aside) = renamed_aside {
            if let Err(e) = fs::rename(&aside, destination) {
                tracing::warn!("Restoring {:?} to {:?} failed: {e}", aside, destination);
            }
        }
        match mode {
            WorkingCopyMode::Copy => {
                if let Err(e) = fs::remove_file(working_copy) {
                    tracing::warn!("Delete working copy {:?} failed: {e}", working_copy);
                }
            }
            // the moved source only exists as the working copy now
            WorkingCopyMode::Move => {
                if let Err(e) = move_file(working_copy, source) {
                    tracing::error!(
                        "Moving {:?} back to {:?} failed: {e}",
                        working_copy,
                        source
                    );
                }
            }
        }
    }
}

fn write_snapshot(working_copy: &Path, destination: &Path, vacuum: bool) -> Result<()> {
    let conn = Connection::open(working_copy)?;
    if vacuum {
        let destination = destination
            .to_str()
            .ok_or_else(|| Error::NonUtf8Path(destination.to_path_buf()))?;
        conn.execute("VACUUM INTO ?1", [destination])?;
    } else {
        conn.backup(MAIN_DB, destination, None)?;
    }
    Ok(())
}

fn move_with_retry(src: &Path, dst: &Path, retry: MoveRetry) -> bool {
    for attempt in 1..=retry.attempts {
        match move_file(src, dst) {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(
                    "File transfer error. Attempt {}/{}. Error: {e}",
                    attempt,
                    retry.attempts
                );
                if attempt < retry.attempts {
                    std::thread::sleep(retry.interval);
                }
            }
        }
    }
    false
}

fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            // rename cannot cross filesystems
            tracing::debug!("Rename {:?} failed ({e}), copying instead", src);
            fs::copy(src, dst)?;
            fs::remove_file(src).inspect_err(|_| {
                let _ = fs::remove_file(dst);
            })
        }
    }
}
