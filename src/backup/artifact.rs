//! File names of the things a backup leaves in the backup directory.
//!
//! A backup family is identified by the database name; every artifact of one
//! run carries the calendar date, so a second run on the same day collides
//! with the first by name and has to move the older file aside.

use crate::backup::clock::Clock;
use crate::backup::database::DatabaseDescriptor;
use crate::backup::result_error::result::Result;

use derive_more::Display;

use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ArtifactKind {
    #[display("db")]
    Backup,
    #[display("7z")]
    Archive,
}

/// `{name}_backup_{date}` without extension.
pub fn backup_stem(name: &str, date: &str) -> String {
    format!("{name}_backup_{date}")
}

pub fn artifact_path(descriptor: &DatabaseDescriptor, date: &str, kind: ArtifactKind) -> PathBuf {
    descriptor
        .backup_dir()
        .join(format!("{}.{}", backup_stem(descriptor.name(), date), kind))
}

/// The temporary duplicate of the live database that the snapshot reads from.
pub fn working_copy_path(descriptor: &DatabaseDescriptor) -> PathBuf {
    descriptor
        .backup_dir()
        .join(format!("{}_copy_for_backup.db", descriptor.name()))
}

/// `{stem}_copy_{HH_MM_SS.mmm}.{ext}` next to `path`.
pub fn aside_path(path: &Path, time: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_copy_{time}.{}", ext.to_string_lossy()),
        None => format!("{stem}_copy_{time}"),
    };
    path.with_file_name(file_name)
}

/// Renames an existing file at `path` out of the way so it is never
/// overwritten. Returns where it went, or `None` if there was nothing there.
pub fn rename_aside(path: &Path, clock: &dyn Clock) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let aside = aside_path(path, &clock.current_time_for_file_name());
    tracing::warn!("{:?} already exists, renaming it to {:?}", path, aside);
    std::fs::rename(path, &aside)?;
    Ok(Some(aside))
}
