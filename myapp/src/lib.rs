//! MyApp - [Your app description]
//!
//! Scheduled AWS Lambda function. `bootstrap` is the Lambda entry point,
//! `local_runner` runs the same service on a workstation.

pub mod config;
pub mod handler;
pub mod runner;
pub mod service;

pub use config::{Config, ConfigError, EnvSnapshot};
pub use handler::{function_handler, HandlerResponse};
pub use service::{AppService, ProcessingResults};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
