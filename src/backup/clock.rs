use chrono::{DateTime, Local};
use std::fmt::Debug;

/// Calendar date used in backup and log file names, e.g. `19.10.2026`.
pub static DATE_FORMAT: &str = "%d.%m.%Y";
/// Time of day used when renaming an existing artifact aside.
pub static TIME_FORMAT: &str = "%H:%M:%S%.3f";

pub trait Clock: Debug {
    fn now(&self) -> DateTime<Local>;

    fn current_date(&self) -> String {
        self.now().format(DATE_FORMAT).to_string()
    }

    /// `HH_MM_SS.mmm`: the time of day with colons made file-name safe.
    fn current_time_for_file_name(&self) -> String {
        self.now().format(TIME_FORMAT).to_string().replace(':', "_")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
