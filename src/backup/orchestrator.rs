//! One backup run over every configured database.
//!
//! Order of a run: sweep stale logs, stop services, then per database sweep
//! old artifacts and take a snapshot, then archive every database, then start
//! services again. A database that fails is logged and skipped, the others
//! are still attempted, and services are always restarted.

use crate::backup::backup_config::ResolvedConfig;
use crate::backup::clock::Clock;
use crate::backup::compress::{Archiver, Compressor};
use crate::backup::database::DatabaseDescriptor;
use crate::backup::disk::DiskSpace;
use crate::backup::process::ProcessRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithMsg;
use crate::backup::retention::{
    backup_archive_pattern, backup_db_pattern, log_file_pattern, rotated_archive_db_pattern,
    sweep,
};
use crate::backup::services::{ServiceAction, ServiceController};
use crate::backup::snapshot::{MoveRetry, SnapshotEngine, SnapshotOutcome, WorkingCopyMode};

use bon::Builder;
use itertools::Itertools;

use std::path::PathBuf;
use std::time::SystemTime;

/// Process exit codes derived from a [`RunReport`].
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const STARTUP_FAILURE: i32 = 1;
    pub const PARTIAL_FAILURE: i32 = 2;
    pub const TOTAL_FAILURE: i32 = 3;
}

#[derive(Debug)]
pub struct DatabaseReport {
    pub name: String,
    pub snapshot: Result<SnapshotOutcome>,
    pub archive: Option<Result<PathBuf>>,
}

impl DatabaseReport {
    fn new(name: &str, snapshot: Result<SnapshotOutcome>) -> Self {
        Self {
            name: name.to_string(),
            snapshot,
            archive: None,
        }
    }

    /// Whether this database ended the run without a usable new backup.
    pub fn failed(&self, strict_size_check: bool) -> bool {
        match (&self.snapshot, &self.archive) {
            (Err(_), _) => true,
            (Ok(_), Some(Err(_))) => true,
            (Ok(outcome), _) => strict_size_check && outcome.too_small,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match &self.snapshot {
            Err(e) => errors.push(e.to_string()),
            Ok(outcome) if outcome.too_small => errors.push(
                Error::BackupTooSmall {
                    path: outcome.artifact.clone(),
                    backup_size: outcome.backup_size,
                    db_size: outcome.db_size,
                }
                .to_string(),
            ),
            Ok(_) => {}
        }
        if let Some(Err(e)) = &self.archive {
            errors.push(e.to_string());
        }
        errors
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub date: String,
    pub strict_size_check: bool,
    pub databases: Vec<DatabaseReport>,
    pub service_failures: Vec<ServiceAction>,
    /// Every retention sweep failure of the run, folded into one error.
    pub sweep_failure: Option<Error>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.databases
            .iter()
            .filter(|d| d.failed(self.strict_size_check))
            .count()
    }

    pub fn exit_code(&self) -> i32 {
        let failed = self.failed_count();
        if failed == 0 {
            exit_code::SUCCESS
        } else if failed == self.databases.len() {
            exit_code::TOTAL_FAILURE
        } else {
            exit_code::PARTIAL_FAILURE
        }
    }

    pub fn log_summary(&self) {
        for db in &self.databases {
            if db.failed(self.strict_size_check) {
                tracing::error!("{}: FAILED\n{}", db.name, db.errors().join("\n"));
            } else if let Some(Ok(archive)) = &db.archive {
                tracing::info!("{}: OK -> {:?}", db.name, archive);
            } else {
                tracing::warn!("{}: finished with warnings: {}", db.name, db.errors().join("; "));
            }
        }
        for action in &self.service_failures {
            tracing::warn!("Service command failed: {}", action.command);
        }
        if let Some(e) = &self.sweep_failure {
            tracing::warn!("Old files were not all deleted:\n{e}");
        }
        tracing::info!(
            "Backup finished: {} of {} database(s) failed",
            self.failed_count(),
            self.databases.len()
        );
    }
}

/// The collaborators one run talks to.
#[derive(Debug, Builder)]
pub struct Orchestrator<'a> {
    config: &'a ResolvedConfig,
    clock: &'a dyn Clock,
    disk: &'a dyn DiskSpace,
    runner: &'a dyn ProcessRunner,
    compressor: &'a dyn Compressor,
    #[builder(into)]
    log_dir: PathBuf,
    #[builder(default)]
    move_retry: MoveRetry,
}

impl Orchestrator<'_> {
    pub fn run(&self) -> RunReport {
        // fixed once so a run crossing midnight archives what it created
        let date = self.clock.current_date();
        let now = SystemTime::from(self.clock.now());
        tracing::info!("Backup run for {} on {}", self.config.lpu_name(), date);

        let mut sweep_failure = self.sweep_logs(now).err();

        let services = ServiceController::new(self.runner, self.config);
        let mut service_actions = services.stop_all();

        let engine = SnapshotEngine::new(self.clock, self.disk, self.move_retry);
        let mut reports = self
            .config
            .databases()
            .iter()
            .map(|db| {
                tracing::info!("Backup of {} started", db.name());
                if let Err(e) = self.sweep_old_artifacts(db, now) {
                    sweep_failure = Some(match sweep_failure.take() {
                        Some(earlier) => earlier.chain(e),
                        None => e,
                    });
                }
                let snapshot = engine.snapshot(db, &date, self.working_copy_mode(db));
                if let Err(e) = &snapshot {
                    tracing::error!("Backup of {} failed: {e}", db.name());
                }
                DatabaseReport::new(db.name(), snapshot)
            })
            .collect_vec();

        let archiver = Archiver::new(self.compressor, self.clock);
        for (db, report) in self.config.databases().iter().zip(reports.iter_mut()) {
            let archived = archiver.archive(db, &date);
            // a missing backup after a failed snapshot is already accounted for
            if report.snapshot.is_ok() || archived.is_ok() {
                report.archive = Some(archived);
            }
        }

        service_actions.extend(services.start_all());

        RunReport {
            date,
            strict_size_check: self.config.strict_size_check(),
            databases: reports,
            service_failures: service_actions.into_iter().filter(|a| !a.success).collect(),
            sweep_failure,
        }
    }

    fn working_copy_mode(&self, db: &DatabaseDescriptor) -> WorkingCopyMode {
        if self.config.is_archive_db(db) {
            WorkingCopyMode::Move
        } else {
            WorkingCopyMode::Copy
        }
    }

    fn sweep_logs(&self, now: SystemTime) -> Result<()> {
        tracing::info!("Deleting old logs");
        let report = sweep(
            &self.log_dir,
            self.config.retention_days(),
            &log_file_pattern(),
            now,
        );
        tracing::info!("Old logs deleted: {}", report.deleted.len());
        convert_error_vec(report.failed).with_msg(format!("Sweeping logs in {:?}", self.log_dir))
    }

    fn sweep_old_artifacts(&self, db: &DatabaseDescriptor, now: SystemTime) -> Result<()> {
        tracing::info!("Deleting old backups and archives");
        let mut patterns = vec![backup_db_pattern(db.name()), backup_archive_pattern(db.name())];
        if !self.config.is_archive_db(db) {
            patterns.push(rotated_archive_db_pattern(db.name()));
        }

        let mut deleted = 0;
        let mut errors = Vec::new();
        for pattern in patterns {
            match pattern {
                Ok(pattern) => {
                    let report = sweep(db.backup_dir(), db.retention_days(), &pattern, now);
                    deleted += report.deleted.len();
                    errors.extend(report.failed);
                }
                Err(e) => {
                    tracing::error!("Cannot build sweep pattern for {}: {e}", db.name());
                    errors.push(e);
                }
            }
        }
        tracing::info!("Old backups and archives are deleted: {}", deleted);
        convert_error_vec(errors).with_msg(format!("Sweeping old artifacts of {}", db.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::backup_config::test_support::resolved_config;
    use crate::backup::backup_config::IisMode;
    use crate::backup::clock::fake::FixedClock;
    use crate::backup::compress::seven_zip::SevenZip;
    use crate::backup::disk::fake::FixedDiskSpace;
    use crate::backup::process::fake::FakeProcessRunner;
    use rusqlite::Connection;
    use std::fs::File;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE visits (id INTEGER PRIMARY KEY, note TEXT);
             INSERT INTO visits (note) VALUES ('a'), ('b'), ('c');",
        )
        .unwrap();
    }

    fn descriptor(dir: &Path, name: &str) -> DatabaseDescriptor {
        DatabaseDescriptor::builder()
            .source_path(dir.join(format!("{name}.db")))
            .name(name)
            .backup_dir(dir)
            .retention_days(5)
            .build()
    }

    fn age(path: &Path, days: u64, clock: &FixedClock) {
        let mtime = SystemTime::from(clock.now()) - Duration::from_secs(days * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn no_wait() -> MoveRetry {
        MoveRetry {
            attempts: 1,
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_end_to_end_single_database() {
        let data = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let d = descriptor(data.path(), "app");
        create_db(d.source_path());

        let stale_backup = data.path().join("app_backup_01.10.2026.db");
        let stale_archive = data.path().join("app_backup_02.10.2026.7z");
        let recent_archive = data.path().join("app_backup_18.10.2026.7z");
        let stale_log = logs.path().join("backup_01.10.2026.log");
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        for p in [&stale_backup, &stale_archive, &stale_log] {
            std::fs::write(p, b"old").unwrap();
            age(p, 10, &clock);
        }
        std::fs::write(&recent_archive, b"recent").unwrap();
        age(&recent_archive, 1, &clock);

        let config = resolved_config(vec![d.clone()]);
        let disk = FixedDiskSpace(u64::MAX);
        let runner = FakeProcessRunner::working_archiver();
        let seven_zip = SevenZip::new(config.seven_zip(), &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(logs.path())
            .move_retry(no_wait())
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::SUCCESS);
        assert_eq!(report.date, "19.10.2026");
        assert!(!stale_backup.exists());
        assert!(!stale_archive.exists());
        assert!(!stale_log.exists());
        assert!(recent_archive.exists());
        assert!(!data.path().join("app_backup_19.10.2026.db").exists());
        assert!(data.path().join("app_backup_19.10.2026.7z").is_file());
        assert!(d.source_path().is_file());
        assert!(!data.path().join("app_copy_for_backup.db").exists());
        assert!(report.sweep_failure.is_none());
    }

    #[test]
    fn test_sweep_failures_are_reported_but_do_not_fail_the_run() {
        let data = TempDir::new().unwrap();
        let d = descriptor(data.path(), "app");
        create_db(d.source_path());

        let config = resolved_config(vec![d]);
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        let disk = FixedDiskSpace(u64::MAX);
        let runner = FakeProcessRunner::working_archiver();
        let seven_zip = SevenZip::new("7za", &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(data.path().join("no-such-log-dir"))
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::SUCCESS);
        let failure = report.sweep_failure.as_ref().unwrap();
        assert!(matches!(failure.root(), Error::LotsOfError(errors) if errors.len() == 1));
        assert!(failure.to_string().contains("no-such-log-dir"));
    }

    #[test]
    fn test_failed_database_does_not_stop_the_others() {
        let data = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let good = descriptor(data.path(), "good");
        let broken = descriptor(data.path(), "broken");
        create_db(good.source_path());
        create_db(broken.source_path());
        std::fs::create_dir(data.path().join("broken_copy_for_backup.db")).unwrap();

        let config = resolved_config(vec![broken.clone(), good.clone()]);
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        let disk = FixedDiskSpace(u64::MAX);
        let runner = FakeProcessRunner::working_archiver();
        let seven_zip = SevenZip::new("7za", &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(logs.path())
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::PARTIAL_FAILURE);
        assert!(matches!(
            report.databases[0].snapshot,
            Err(Error::WorkingCopyMissing(_))
        ));
        assert!(report.databases[0].archive.is_none());
        assert!(report.databases[1].snapshot.is_ok());
        assert!(data.path().join("good_backup_19.10.2026.7z").is_file());
    }

    #[test]
    fn test_no_space_anywhere_is_total_failure_and_services_restart() {
        let data = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let d = descriptor(data.path(), "app");
        create_db(d.source_path());

        let config = resolved_config(vec![d]).with_services(
            &["MedService"],
            &[],
            &[],
            IisMode::Enabled,
        );
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        let disk = FixedDiskSpace(0);
        let runner = FakeProcessRunner::working_archiver();
        let seven_zip = SevenZip::new("7za", &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(logs.path())
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::TOTAL_FAILURE);
        let lines = runner
            .calls()
            .into_iter()
            .map(|c| c.join(" "))
            .collect_vec();
        assert_eq!(
            lines,
            vec!["sc stop MedService", "iisreset /stop", "sc start MedService", "iisreset /start"]
        );
    }

    #[test]
    fn test_archiver_unavailable_keeps_backup_and_fails_database() {
        let data = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let d = descriptor(data.path(), "app");
        create_db(d.source_path());

        let config = resolved_config(vec![d]);
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        let disk = FixedDiskSpace(u64::MAX);
        let runner = FakeProcessRunner {
            missing_programs: vec!["7za".to_string()],
            ..FakeProcessRunner::default()
        };
        let seven_zip = SevenZip::new("7za", &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(logs.path())
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::TOTAL_FAILURE);
        assert!(data.path().join("app_backup_19.10.2026.db").is_file());
        assert!(matches!(
            report.databases[0].archive.as_ref().unwrap().as_ref().unwrap_err().root(),
            Error::ArchiverUnavailable(_)
        ));
    }

    #[test]
    fn test_archive_database_keeps_its_rotated_archives() {
        let data = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let d = descriptor(data.path(), "tcgi_archive");
        create_db(d.source_path());
        let rotated = data.path().join("tcgi_archive_archive_2020.db");
        let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
        std::fs::write(&rotated, b"rotated").unwrap();
        age(&rotated, 30, &clock);

        let config = resolved_config(vec![d.clone()]);
        let disk = FixedDiskSpace(u64::MAX);
        let runner = FakeProcessRunner::working_archiver();
        let seven_zip = SevenZip::new("7za", &runner);

        let report = Orchestrator::builder()
            .config(&config)
            .clock(&clock)
            .disk(&disk)
            .runner(&runner)
            .compressor(&seven_zip)
            .log_dir(logs.path())
            .move_retry(no_wait())
            .build()
            .run();

        assert_eq!(report.exit_code(), exit_code::SUCCESS);
        assert!(rotated.exists());
        assert!(!d.source_path().exists());
        assert!(data.path().join("tcgi_archive_backup_19.10.2026.7z").is_file());
    }

    #[test]
    fn test_strict_size_check_end_to_end() {
        for strict in [false, true] {
            let data = TempDir::new().unwrap();
            let logs = TempDir::new().unwrap();
            let d = descriptor(data.path(), "app");
            let conn = Connection::open(d.source_path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE visits (id INTEGER PRIMARY KEY, note TEXT);
                 WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 2000)
                 INSERT INTO visits (note) SELECT hex(zeroblob(100)) FROM n;
                 DELETE FROM visits;",
            )
            .unwrap();
            drop(conn);

            let config = resolved_config(vec![d]).with_strict_size_check(strict);
            let clock = FixedClock::at(2026, 10, 19, 12, 0, 0);
            let disk = FixedDiskSpace(u64::MAX);
            let runner = FakeProcessRunner::working_archiver();
            let seven_zip = SevenZip::new("7za", &runner);

            let report = Orchestrator::builder()
                .config(&config)
                .clock(&clock)
                .disk(&disk)
                .runner(&runner)
                .compressor(&seven_zip)
                .log_dir(logs.path())
                .build()
                .run();

            assert!(report.databases[0].snapshot.as_ref().unwrap().too_small);
            assert!(data.path().join("app_backup_19.10.2026.7z").is_file());
            let expected = if strict {
                exit_code::TOTAL_FAILURE
            } else {
                exit_code::SUCCESS
            };
            assert_eq!(report.exit_code(), expected);
        }
    }

    #[test]
    fn test_strict_size_check_counts_too_small_as_failure() {
        let outcome = SnapshotOutcome {
            artifact: PathBuf::from("/b/app_backup_19.10.2026.db"),
            renamed_aside: None,
            db_size: 100,
            backup_size: 10,
            too_small: true,
        };
        let report = |strict| RunReport {
            date: "19.10.2026".to_string(),
            strict_size_check: strict,
            databases: vec![DatabaseReport {
                name: "app".to_string(),
                snapshot: Ok(outcome.clone()),
                archive: Some(Ok(PathBuf::from("/b/app_backup_19.10.2026.7z"))),
            }],
            service_failures: vec![],
            sweep_failure: None,
        };

        assert_eq!(report(false).exit_code(), exit_code::SUCCESS);
        assert_eq!(report(true).exit_code(), exit_code::TOTAL_FAILURE);
        assert!(report(false).databases[0].errors()[0].contains("too small"));
    }
}
