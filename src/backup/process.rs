//! Shell command execution behind a narrow trait.
//!
//! Service control and the external archiver only ever need "run this program
//! with these arguments and tell me whether it succeeded", so that is all the
//! [`ProcessRunner`] seam exposes. A missing binary surfaces as an
//! [`std::io::ErrorKind::NotFound`] error rather than `Ok(false)`.

use std::ffi::OsStr;
use std::fmt::Debug;
use std::io;
use std::process::{Command, Stdio};

pub trait ProcessRunner: Debug {
    /// Runs `program` to completion and reports whether it exited successfully.
    fn run(&self, program: &OsStr, args: &[&OsStr]) -> io::Result<bool>;
}

/// Runs commands with [`std::process::Command`], forwarding their output to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellProcessRunner;

impl ProcessRunner for ShellProcessRunner {
    fn run(&self, program: &OsStr, args: &[&OsStr]) -> io::Result<bool> {
        tracing::debug!("Running {:?} {:?}", program, args);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            tracing::debug!("{:?} stdout: {}", program, stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            tracing::warn!("{:?} stderr: {}", program, stderr);
        }

        Ok(output.status.success())
    }
}
