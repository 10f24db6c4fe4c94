//! # vacuum_backup
//!
//! Unattended nightly backups of live SQLite databases on a single server.
//!
//! ## Features
//!
//! - **Service Window**: Stops OS services, scheduled tasks and IIS around the run
//! - **Consistent Snapshots**: `VACUUM INTO` or the online backup API on a working copy
//! - **Admission Control**: Refuses a backup that could fill the disk
//! - **Same-Day Reruns**: Earlier backups of the day are renamed aside, never overwritten
//! - **Retention**: Age-based deletion of old backups, archives and logs
//! - **Archiving**: 7-Zip compression, the uncompressed copy is removed only once the archive exists
//!
//! ## Quick Start
//!
//! ```no_run
//! use vacuum_backup::backup::backup_config::BackupConfig;
//! use vacuum_backup::backup::clock::SystemClock;
//! use vacuum_backup::backup::compress::seven_zip::SevenZip;
//! use vacuum_backup::backup::disk::Fs2DiskSpace;
//! use vacuum_backup::backup::orchestrator::Orchestrator;
//! use vacuum_backup::backup::process::ShellProcessRunner;
//!
//! let config = BackupConfig::load("config.yml")?.resolve()?;
//! let runner = ShellProcessRunner;
//! let seven_zip = SevenZip::new(config.seven_zip(), &runner);
//!
//! let report = Orchestrator::builder()
//!     .config(&config)
//!     .clock(&SystemClock)
//!     .disk(&Fs2DiskSpace)
//!     .runner(&runner)
//!     .compressor(&seven_zip)
//!     .log_dir(".")
//!     .build()
//!     .run();
//! std::process::exit(report.exit_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
