//! Stopping and restarting everything that writes to the databases.
//!
//! Commands target a Windows host: `sc` for services, `schtasks` for
//! scheduled tasks, `iisreset` for IIS and `taskkill` for stray desktop tools
//! holding the database open.

use crate::backup::backup_config::{IisMode, ResolvedConfig};
use crate::backup::process::ProcessRunner;

use std::ffi::OsStr;

/// Result of one command issued for one named target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceAction {
    pub target: String,
    pub command: String,
    pub success: bool,
}

#[derive(Debug)]
pub struct ServiceController<'a> {
    runner: &'a dyn ProcessRunner,
    services: &'a [String],
    sch_tasks: &'a [String],
    kill_processes: &'a [String],
    iis: IisMode,
}

impl<'a> ServiceController<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, config: &'a ResolvedConfig) -> Self {
        Self {
            runner,
            services: config.services(),
            sch_tasks: config.sch_tasks(),
            kill_processes: config.kill_processes(),
            iis: config.iis(),
        }
    }

    pub fn stop_all(&self) -> Vec<ServiceAction> {
        let mut actions = Vec::new();

        for process in self.kill_processes {
            tracing::info!("Stopping {}", process);
            actions.push(self.run(process, "taskkill", &["/IM", process.as_str(), "/F"]));
        }

        for service in self.services {
            tracing::info!("Turning off \"{}\" service", service);
            actions.push(self.run(service, "sc", &["stop", service.as_str()]));
        }

        for task in self.sch_tasks {
            tracing::info!("Turning off \"{}\" task", task);
            actions.push(self.run(task, "schtasks", &["/end", "/tn", task.as_str()]));
            actions.push(self.run(task, "schtasks", &["/change", "/tn", task.as_str(), "/disable"]));
        }

        if self.iis.is_enabled() {
            tracing::info!("Turning off IIS service");
            actions.push(self.run("IIS", "iisreset", &["/stop"]));
        }

        actions
    }

    pub fn start_all(&self) -> Vec<ServiceAction> {
        let mut actions = Vec::new();

        for service in self.services {
            tracing::info!("Turning on \"{}\" service", service);
            actions.push(self.run(service, "sc", &["start", service.as_str()]));
        }

        for task in self.sch_tasks {
            tracing::info!("Turning on \"{}\" task", task);
            actions.push(self.run(task, "schtasks", &["/change", "/tn", task.as_str(), "/enable"]));
        }

        if self.iis.is_enabled() {
            tracing::info!("Turning on IIS service");
            actions.push(self.run("IIS", "iisreset", &["/start"]));
        }

        actions
    }

    fn run(&self, target: &str, program: &str, args: &[&str]) -> ServiceAction {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!("{}", command);

        let os_args = args.iter().map(OsStr::new).collect::<Vec<_>>();
        let success = match self.runner.run(OsStr::new(program), &os_args) {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("\"{}\" for \"{}\" failed", command, target);
                false
            }
            Err(e) => {
                tracing::warn!("\"{}\" for \"{}\" could not be run: {e}", command, target);
                false
            }
        };

        ServiceAction {
            target: target.to_string(),
            command,
            success,
        }
    }
}
