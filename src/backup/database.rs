//! Per-database configuration and its resolved, immutable descriptor.

use crate::backup::result_error::error::Error;

use bon::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use std::path::{Path, PathBuf};

/// Accepted range for a per-database `delete-after-days` override.
pub const RETENTION_DAYS_RANGE: std::ops::RangeInclusive<i64> = 0..=50;

/// One entry of the `databases` list as written in the config file.
///
/// Nothing here is trusted yet: [`DatabaseConfig::resolve`] turns it into a
/// [`DatabaseDescriptor`] or drops it.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
    #[serde(rename = "backup-dir", default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(rename = "delete-after-days", default)]
    pub delete_after_days: Option<i64>,
    #[serde(rename = "enable-vacuum", default)]
    pub enable_vacuum: Option<serde_yml::Value>,
}

/// A database that passed validation, with every default filled in.
#[derive(Clone, Debug, Serialize, Builder, PartialEq, Eq, Getters, CopyGetters)]
pub struct DatabaseDescriptor {
    #[builder(into)]
    #[getset(get = "pub")]
    source_path: PathBuf,
    #[builder(into)]
    #[getset(get = "pub")]
    name: String,
    #[builder(into)]
    #[getset(get = "pub")]
    backup_dir: PathBuf,
    #[getset(get_copy = "pub")]
    retention_days: u32,
    #[builder(default = true)]
    #[getset(get_copy = "pub")]
    vacuum_enabled: bool,
}

impl DatabaseConfig {
    /// Checks the entry and fills in defaults.
    ///
    /// Returns `None` when the database file is missing, which drops it from
    /// the run. Every other problem is logged and replaced by its default.
    pub fn resolve(&self, default_retention_days: u32) -> Option<DatabaseDescriptor> {
        let source_path = self.db_path.as_path();
        if !source_path.is_file() {
            tracing::error!("{}", Error::DatabaseUnavailable(source_path.to_path_buf()));
            return None;
        }

        let Some(name) = source_path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            tracing::error!("Database path {:?} has no file name!", source_path);
            return None;
        };

        let source_dir = parent_dir(source_path);
        let backup_dir = match &self.backup_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(dir) => {
                tracing::error!(
                    "Backup path {:?} does not exist! Using {:?} instead",
                    dir,
                    source_dir
                );
                source_dir
            }
            None => source_dir,
        };

        let retention_days = match self.delete_after_days {
            Some(days) if RETENTION_DAYS_RANGE.contains(&days) => days as u32,
            Some(days) => {
                tracing::error!(
                    "Special delete after days {} error (need 0 <= x <= 50), using default {}",
                    days,
                    default_retention_days
                );
                default_retention_days
            }
            None => default_retention_days,
        };

        let vacuum_enabled = match &self.enable_vacuum {
            None => true,
            Some(serde_yml::Value::Bool(enabled)) => *enabled,
            Some(other) => {
                tracing::error!("Enable vacuum setting {:?} error, using true", other);
                true
            }
        };

        Some(
            DatabaseDescriptor::builder()
                .source_path(source_path)
                .name(name)
                .backup_dir(backup_dir)
                .retention_days(retention_days)
                .vacuum_enabled(vacuum_enabled)
                .build(),
        )
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
