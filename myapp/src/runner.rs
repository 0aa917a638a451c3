//! The `local_runner` flow: log setup, the required-variable check and one
//! service run.

use crate::config::{missing_required_vars, EnvSnapshot, REQUIRED_VARS};
use crate::{AppService, Config};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, Subscriber};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_FILE: &str = "myapp.log";

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Builds a subscriber logging to stdout and, when a log directory is
/// given, to `<dir>/myapp.log` without ANSI colors. The directory is
/// created if needed.
pub fn log_subscriber(log_dir: Option<&Path>) -> io::Result<(impl Subscriber + Send + Sync + 'static, Option<PathBuf>)> {
    let stdout_layer = fmt::layer().with_target(true);
    let (file_layer, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(LOG_FILE);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(stdout_layer)
        .with(file_layer);
    Ok((subscriber, path))
}

pub fn init_logging(log_dir: Option<&Path>) -> io::Result<Option<PathBuf>> {
    let (subscriber, path) = log_subscriber(log_dir)?;
    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
    Ok(path)
}

/// Checks the required variables, then runs the service once. Returns the
/// process exit code.
pub async fn run_local(env: EnvSnapshot) -> u8 {
    let missing = missing_required_vars(&env, REQUIRED_VARS.iter().copied());
    if !missing.is_empty() {
        error!("Missing required environment variables: {}", missing.join(", "));
        error!("Please set them in your .env file or environment");
        return EXIT_FAILURE;
    }
    info!("All required environment variables found");

    let mut service = AppService::new(Config::from_snapshot(env));
    match service.run().await {
        Ok(_) => {
            info!("MyApp completed successfully!");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("Error running MyApp: {}", e);
            EXIT_FAILURE
        }
    }
}
