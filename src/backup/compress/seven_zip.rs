use crate::backup::compress::Compressor;
use crate::backup::process::ProcessRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

/// The external `7za` command line archiver.
#[derive(Debug)]
pub struct SevenZip<'a> {
    binary: PathBuf,
    runner: &'a dyn ProcessRunner,
}

impl<'a> SevenZip<'a> {
    pub fn new<P: Into<PathBuf>>(binary: P, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }
}

impl Compressor for SevenZip<'_> {
    fn compress(&self, input: &Path, output: &Path) -> Result<bool> {
        tracing::info!("{:?} a {:?} {:?}", self.binary, output, input);
        let args = [OsStr::new("a"), output.as_os_str(), input.as_os_str()];
        match self.runner.run(self.binary.as_os_str(), &args) {
            Ok(success) => Ok(success),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(
                    "{:?} is missing! 7z archiving is not possible!",
                    self.binary
                );
                Err(Error::ArchiverUnavailable(self.binary.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
