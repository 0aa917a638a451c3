use crate::config::{missing_required_vars, Config, ConfigError, EnvSnapshot, REQUIRED_VARS};
use crate::service::AppService;
use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    fn success() -> Self {
        Self {
            status_code: 200,
            body: json!({
                "status": "success",
                "message": "MyApp completed successfully",
            })
            .to_string(),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            status_code: 500,
            body: json!({
                "status": "error",
                "message": message,
            })
            .to_string(),
        }
    }
}

/// Runs one scheduled execution against the given environment.
pub async fn run_app(env: EnvSnapshot) -> Result<(), Error> {
    info!("Starting MyApp - AWS Lambda");

    let missing = missing_required_vars(&env, REQUIRED_VARS.iter().copied());
    if !missing.is_empty() {
        return Err(ConfigError::MissingVars(missing).into());
    }
    info!("Configuration loaded from environment");

    let mut service = AppService::new(Config::from_snapshot(env));
    service.run().await?;
    Ok(())
}

/// EventBridge schedule entry point. Application failures are reported in
/// the response body rather than as a Lambda error.
pub async fn function_handler(event: LambdaEvent<CloudWatchEvent>) -> Result<HandlerResponse, Error> {
    handle_with_env(event, EnvSnapshot::capture()).await
}

pub async fn handle_with_env(
    event: LambdaEvent<CloudWatchEvent>,
    env: EnvSnapshot,
) -> Result<HandlerResponse, Error> {
    info!("Lambda invoked with event: {}", serde_json::to_string(&event.payload)?);

    match run_app(env).await {
        Ok(()) => {
            info!("Lambda execution completed successfully");
            Ok(HandlerResponse::success())
        }
        Err(e) => {
            error!("Lambda execution failed: {}", e);
            Ok(HandlerResponse::failure(&e.to_string()))
        }
    }
}
