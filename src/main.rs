use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use vacuum_backup::backup::backup_config::BackupConfig;
use vacuum_backup::backup::clock::SystemClock;
use vacuum_backup::backup::compress::seven_zip::SevenZip;
use vacuum_backup::backup::disk::Fs2DiskSpace;
use vacuum_backup::backup::log_file::{init_tracing, open_log_file, NEW_RUN_MARKER};
use vacuum_backup::backup::orchestrator::{exit_code, Orchestrator};
use vacuum_backup::backup::process::ShellProcessRunner;
use vacuum_backup::backup::result_error::error::Error;
use vacuum_backup::backup::result_error::WithMsg;

/// Stop services, back up SQLite databases, archive them, start services again
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Directory of the daily log files
    #[arg(short, long, default_value = ".")]
    log_dir: PathBuf,

    /// Only load and validate the config, then print it resolved
    #[arg(long)]
    check: bool,

    /// Log debug events as well
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let clock = SystemClock;

    match open_log_file(&args.log_dir, &clock) {
        Ok(file) => {
            let level = if args.verbose {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            };
            init_tracing(file, level);
        }
        Err(e) => {
            eprintln!("Cannot open log file in {:?}: {e}", args.log_dir);
            exit(exit_code::STARTUP_FAILURE);
        }
    }
    info!("{NEW_RUN_MARKER}");

    let config = BackupConfig::load(&args.config).and_then(|c| {
        c.resolve()
            .with_msg(format!("Config resolution failed: {:?}", &args.config))
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            exit(exit_code::STARTUP_FAILURE);
        }
    };

    if args.check {
        match serde_yml::to_string(&config).map_err(Error::from) {
            Ok(yaml) => println!("{yaml}"),
            Err(e) => {
                error!("{e}");
                exit(exit_code::STARTUP_FAILURE);
            }
        }
        exit(exit_code::SUCCESS);
    }

    let runner = ShellProcessRunner;
    let disk = Fs2DiskSpace;
    let seven_zip = SevenZip::new(config.seven_zip(), &runner);

    let report = Orchestrator::builder()
        .config(&config)
        .clock(&clock)
        .disk(&disk)
        .runner(&runner)
        .compressor(&seven_zip)
        .log_dir(args.log_dir.as_path())
        .build()
        .run();

    report.log_summary();
    exit(report.exit_code());
}
