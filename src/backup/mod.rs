pub mod artifact;
pub mod backup_config;
pub mod clock;
pub mod compress;
pub mod database;
pub mod disk;
pub mod log_file;
pub mod orchestrator;
pub mod process;
pub mod result_error;
pub mod retention;
pub mod services;
pub mod snapshot;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
