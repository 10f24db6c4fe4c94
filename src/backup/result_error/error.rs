use crate::backup::result_error::{WithDebugObjectAndFnName, WithFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Database {0:?} does not exist or is not a file")]
    DatabaseUnavailable(PathBuf),
    #[error("NOT enough free space for backup: need more than {needed} bytes, {free} bytes free")]
    InsufficientDiskSpace { needed: u64, free: u64 },
    #[error("Copy is missing: {0:?}")]
    WorkingCopyMissing(PathBuf),
    #[error("Backup {path:?} is too small: {backup_size} bytes for a {db_size} bytes database")]
    BackupTooSmall {
        path: PathBuf,
        backup_size: u64,
        db_size: u64,
    },
    #[error("Backup is missing: {0:?}")]
    BackupMissing(PathBuf),
    #[error("Archiver {0:?} is missing, archiving is not possible")]
    ArchiverUnavailable(PathBuf),
    #[error("Archive {0:?} was not created")]
    ArchiveMissing(PathBuf),
    #[error("Path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { error: Box<Error>, fn_name: String },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> WithFnName<S> for Error {
    fn with_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Strips context wrappers and returns the error that actually happened.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. }
            | Error::WithDebugObjAndFnName { error, .. }
            | Error::WithFnName { error, .. } => error.root(),
            e => e,
        }
    }
}
