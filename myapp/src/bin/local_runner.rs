use myapp::config::{application_env_file, EnvSnapshot, APPLICATION_ENV, LOG_DIR};
use myapp::runner::{init_logging, run_local};
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before logging so MYAPP_LOG_DIR from .env is honored; the
    // outcome is reported once logging is up.
    let env_file = application_env_file();
    let env = EnvSnapshot::capture();

    let log_file = match init_logging(env.get(LOG_DIR).map(Path::new)) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("failed to set up log file: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Starting MyApp - Local Development");
    env_file.log(APPLICATION_ENV);
    if let Some(path) = log_file {
        info!("Log file: {}", path.display());
    }

    ExitCode::from(run_local(env).await)
}
