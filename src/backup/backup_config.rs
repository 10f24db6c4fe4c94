use crate::backup::database::{DatabaseConfig, DatabaseDescriptor};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{validate_not_blank, validate_regex};

use getset::{CopyGetters, Getters};
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

use std::fs::File;
use std::path::{Path, PathBuf};

static DEFAULT_ARCHIVE_DB_PATTERN: &str = "(?i)^tcgi.*_archive$";
static DEFAULT_SEVEN_ZIP: &str = "7za";
static DEFAULT_KILL_PROCESSES: &[&str] = &["SQLiteStudio.exe"];
static IIS_SENDED_API: &str = "true_sendedapi";

/// The config file exactly as written on disk.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct BackupConfig {
    #[serde(rename = "lpu-name", default)]
    #[validate(custom(function = validate_not_blank))]
    pub lpu_name: String,
    #[serde(default)]
    pub iis: IisMode,
    #[serde(default)]
    pub services: Option<Vec<String>>,
    #[serde(rename = "sch-tasks", default)]
    pub sch_tasks: Option<Vec<String>>,
    #[serde(rename = "kill-processes", default = "default_kill_processes")]
    pub kill_processes: Vec<String>,
    #[serde(rename = "delete-after-days", default = "default_delete_after_days")]
    #[validate(range(min = 0, max = 50))]
    pub delete_after_days: i64,
    #[serde(rename = "archive-db-pattern", default = "default_archive_db_pattern")]
    #[validate(custom(function = validate_regex))]
    pub archive_db_pattern: String,
    #[serde(rename = "seven-zip", default = "default_seven_zip")]
    pub seven_zip: PathBuf,
    #[serde(rename = "strict-size-check", default)]
    pub strict_size_check: bool,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub databases: Vec<DatabaseConfig>,
}

fn default_kill_processes() -> Vec<String> {
    DEFAULT_KILL_PROCESSES.iter().map(|s| s.to_string()).collect()
}

fn default_delete_after_days() -> i64 {
    5
}

fn default_archive_db_pattern() -> String {
    DEFAULT_ARCHIVE_DB_PATTERN.to_string()
}

fn default_seven_zip() -> PathBuf {
    PathBuf::from(DEFAULT_SEVEN_ZIP)
}

/// Whether the IIS web server has to be stopped around the backup window.
///
/// On disk this is a boolean, or the literal `true_sendedapi` which behaves
/// like `true`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IisRepr", into = "IisRepr")]
pub enum IisMode {
    Disabled,
    #[default]
    Enabled,
    EnabledSendedApi,
}

impl IisMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, IisMode::Disabled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum IisRepr {
    Flag(bool),
    Sentinel(String),
}

impl TryFrom<IisRepr> for IisMode {
    type Error = String;

    fn try_from(value: IisRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            IisRepr::Flag(false) => Ok(IisMode::Disabled),
            IisRepr::Flag(true) => Ok(IisMode::Enabled),
            IisRepr::Sentinel(s) if s == IIS_SENDED_API => Ok(IisMode::EnabledSendedApi),
            IisRepr::Sentinel(s) => Err(format!(
                "invalid iis value {s:?}, expected true, false or {IIS_SENDED_API:?}"
            )),
        }
    }
}

impl From<IisMode> for IisRepr {
    fn from(value: IisMode) -> Self {
        match value {
            IisMode::Disabled => IisRepr::Flag(false),
            IisMode::Enabled => IisRepr::Flag(true),
            IisMode::EnabledSendedApi => IisRepr::Sentinel(IIS_SENDED_API.to_string()),
        }
    }
}

/// Validated configuration with every database resolved, shared by all
/// downstream components for the duration of one run.
#[derive(Clone, Debug, Serialize, Getters, CopyGetters)]
pub struct ResolvedConfig {
    #[getset(get = "pub")]
    lpu_name: String,
    #[getset(get_copy = "pub")]
    iis: IisMode,
    #[getset(get = "pub")]
    services: Vec<String>,
    #[getset(get = "pub")]
    sch_tasks: Vec<String>,
    #[getset(get = "pub")]
    kill_processes: Vec<String>,
    #[getset(get_copy = "pub")]
    retention_days: u32,
    #[serde(with = "serde_regex_str")]
    #[getset(get = "pub")]
    archive_db_pattern: Regex,
    #[getset(get = "pub")]
    seven_zip: PathBuf,
    #[getset(get_copy = "pub")]
    strict_size_check: bool,
    #[getset(get = "pub")]
    databases: Vec<DatabaseDescriptor>,
}

mod serde_regex_str {
    use regex::Regex;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(regex.as_str())
    }
}

impl BackupConfig {
    /// Reads, parses and validates the YAML config file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<BackupConfig> {
        let path = path.as_ref();
        tracing::info!("Config file reading started: {:?}", path);
        let config = File::open(path)
            .map_err(Error::from)
            .with_msg(format!("Config file {:?} does not exist!", path))
            .and_then(|f| {
                serde_yml::from_reader::<_, BackupConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })?;
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }

    /// Resolves every database against the global defaults.
    ///
    /// Databases whose file is missing are dropped; the run is only refused
    /// when none are left.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;
        let retention_days = u32::try_from(self.delete_after_days).map_err(|_| {
            Error::ConfigInvalid(format!(
                "delete-after-days {} is out of range",
                self.delete_after_days
            ))
        })?;
        let archive_db_pattern = Regex::new(&self.archive_db_pattern)?;

        let databases = self
            .databases
            .iter()
            .filter_map(|db| db.resolve(retention_days))
            .collect_vec();

        if databases.is_empty() {
            return Err(Error::ConfigInvalid(
                "Databases list is empty after dropping unavailable databases".to_string(),
            ));
        }
        let dropped = self.databases.len() - databases.len();
        if dropped > 0 {
            tracing::warn!("{} database(s) dropped from this run", dropped);
        }

        Ok(ResolvedConfig {
            lpu_name: self.lpu_name.trim().to_string(),
            iis: self.iis,
            services: self.services.clone().unwrap_or_default(),
            sch_tasks: self.sch_tasks.clone().unwrap_or_default(),
            kill_processes: self.kill_processes.clone(),
            retention_days,
            archive_db_pattern,
            seven_zip: self.seven_zip.clone(),
            strict_size_check: self.strict_size_check,
            databases,
        })
    }
}

impl ResolvedConfig {
    /// Databases named like an already rotated archive get moved instead of
    /// copied, and their `_archive_` files are never swept.
    pub fn is_archive_db(&self, descriptor: &DatabaseDescriptor) -> bool {
        self.archive_db_pattern.is_match(descriptor.name())
    }
}
