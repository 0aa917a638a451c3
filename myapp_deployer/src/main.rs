use clap::Parser;
use myapp_deployer::args::DeployArgs;
use std::error::Error as _;
use std::process::ExitCode;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = DeployArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    tokio::select! {
        result = myapp_deployer::run(&args) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("MyApp deployment failed: {}", e);
                if args.verbose {
                    let mut source = e.source();
                    while let Some(cause) = source {
                        error!("  caused by: {}", cause);
                        source = cause.source();
                    }
                }
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Deployment interrupted by user");
            ExitCode::from(130)
        }
    }
}
