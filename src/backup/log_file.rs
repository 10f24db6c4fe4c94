//! The dated log file operators read after each run.
//!
//! Only the binary installs a subscriber; the library just emits `tracing`
//! events, so tests and embedders decide where they go.

use crate::backup::clock::Clock;
use crate::backup::result_error::result::Result;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Written at the start of every run so runs sharing a day's file can be told apart.
pub static NEW_RUN_MARKER: &str = "NEW BACKUP STARTED";
static LOG_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S%.3f";

/// `backup_{DD.MM.YYYY}.log` in `dir`, one file per calendar day.
pub fn log_file_path(dir: &Path, clock: &dyn Clock) -> PathBuf {
    dir.join(format!("backup_{}.log", clock.current_date()))
}

/// Opens today's log file for appending and separates this run from the
/// previous one with an empty line.
pub fn open_log_file(dir: &Path, clock: &dyn Clock) -> Result<File> {
    std::fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(dir, clock))?;
    writeln!(file)?;
    Ok(file)
}

/// Sends every event at `level` or above to `file` and to stdout.
pub fn init_tracing(file: File, level: LevelFilter) {
    let file_layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_target(false);

    tracing_subscriber::registry()
        .with(level)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}
