pub mod seven_zip;

use crate::backup::artifact::{artifact_path, rename_aside, ArtifactKind};
use crate::backup::clock::Clock;
use crate::backup::database::DatabaseDescriptor;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFnName;

use function_name::named;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Turns one file into a single-file archive.
pub trait Compressor: Debug {
    /// Returns whether the compressor reported success. A compressor that
    /// cannot be run at all yields [`Error::ArchiverUnavailable`].
    fn compress(&self, input: &Path, output: &Path) -> Result<bool>;
}

/// Compresses finished backups and removes the uncompressed copy once the
/// archive is confirmed on disk.
#[derive(Debug)]
pub struct Archiver<'a> {
    compressor: &'a dyn Compressor,
    clock: &'a dyn Clock,
}

impl<'a> Archiver<'a> {
    pub fn new(compressor: &'a dyn Compressor, clock: &'a dyn Clock) -> Self {
        Self { compressor, clock }
    }

    /// Archives `{name}_backup_{date}.db` into `{name}_backup_{date}.7z`.
    ///
    /// The `.db` is left in place on every failure.
    #[named]
    pub fn archive(&self, descriptor: &DatabaseDescriptor, date: &str) -> Result<PathBuf> {
        let name = descriptor.name();
        let backup = artifact_path(descriptor, date, ArtifactKind::Backup);
        if !backup.is_file() {
            tracing::error!("Backup of {} is missing!", name);
            return Err(Error::BackupMissing(backup));
        }

        let archive = artifact_path(descriptor, date, ArtifactKind::Archive);
        // never let a rerun update the archive written earlier today
        rename_aside(&archive, self.clock).with_fn_name(function_path!())?;

        tracing::info!("Archivation of {} started", name);
        let reported_ok = self
            .compressor
            .compress(&backup, &archive)
            .with_fn_name(function_path!())?;

        if !reported_ok || !archive.is_file() {
            tracing::error!(
                "Archivation of {} failed, keeping {:?} uncompressed",
                name,
                backup
            );
            return Err(Error::ArchiveMissing(archive));
        }
        tracing::info!("Archivation of {} ended", name);

        tracing::info!("Deleting {:?}", backup);
        std::fs::remove_file(&backup)?;
        Ok(archive)
    }
}
