//! Deployment for MyApp: validates the application environment, packages the
//! `bootstrap` binary, and provisions the IAM role, Lambda function,
//! EventBridge schedule and budget alerts.

pub mod args;
pub mod aws;
pub mod config;
pub mod deployer;
pub mod error;
pub mod package;
pub mod policy;
pub mod provisioner;
pub mod validators;

use crate::args::DeployArgs;
use crate::aws::AwsProvisioner;
use crate::config::{load_deployment_env, DeployConfig};
use crate::deployer::{Deployer, DeploymentOutcome, DeploymentStep};
use crate::error::DeployError;
use crate::provisioner::{DryRunProvisioner, LocalProvisioner, Provisioner};
use crate::validators::{ConfigValidator, EnvironmentValidator};
use myapp::config::{load_first_env_file, EnvFile, EnvSnapshot, APPLICATION_ENV};
use std::env;
use tracing::{info, warn};

fn rule() -> String {
    "-".repeat(60)
}

/// Steps run for this app. Insert custom steps here.
pub fn app_deployment_steps(config: &DeployConfig) -> Vec<DeploymentStep> {
    deployer::default_steps(config)
}

fn load_application_env() {
    let Ok(cwd) = env::current_dir() else {
        return;
    };
    let paths = [cwd.join("myapp").join(".env"), cwd.join(".env")];
    let loaded = load_first_env_file(&paths, true);
    loaded.log(APPLICATION_ENV);
    if loaded == EnvFile::NotFound {
        info!("Create one from .env.example:");
        info!("   cp myapp/.env.example myapp/.env");
    }
}

fn log_summary(config: &DeployConfig) {
    info!("Configuration Summary:");
    info!("  Function: {}", config.function_name);
    info!("  Region: {}", config.region);
    info!("  Runtime: {}", config.runtime);
    info!("  Memory: {} MB", config.memory_size);
    info!("  Timeout: {} sec", config.timeout);
    info!("  Schedule: {}", config.schedule_expression);

    if config.local_test_enabled {
        info!("  Mode: LOCAL TEST ONLY");
    } else if config.enable_budget {
        info!("  Budget: ${}/month", config.budget_limit);
        info!("  Budget Name: {}", config.budget_name);
        if let Some(email) = &config.budget_email {
            info!("  Alert Email: {}", email);
        }
    } else {
        warn!("  Budget: DISABLED (not recommended)");
    }
}

async fn deploy_with<P: Provisioner>(
    config: DeployConfig,
    env: EnvSnapshot,
    provisioner: P,
) -> Result<DeploymentOutcome, DeployError> {
    let steps = app_deployment_steps(&config);
    let mut deployer = Deployer::new(config, env, provisioner);
    deployer.set_steps(steps);
    deployer.deploy().await
}

pub async fn run(args: &DeployArgs) -> Result<(), DeployError> {
    info!("MyApp Deployment");
    info!("{}", "=".repeat(60));

    info!("Step 1: Loading Application Configuration");
    info!("{}", rule());
    load_application_env();
    let env = EnvSnapshot::capture();

    if !args.skip_validation {
        info!("Step 2: MyApp Environment Validation");
        info!("{}", rule());
        let required = DeployConfig::default().required_env_vars;
        if !EnvironmentValidator::new(&required).validate(&env) {
            return Err(DeployError::Validation("Environment"));
        }
    } else {
        warn!("Skipping validation (--skip-validation)");
    }

    info!("Step 3: Loading Deployment Configuration");
    info!("{}", rule());
    load_deployment_env();
    let env = EnvSnapshot::capture();
    let config = DeployConfig::resolve(args, &env)?;
    if !args.skip_validation {
        if !ConfigValidator::validate(&config) {
            return Err(DeployError::Validation("Configuration"));
        }
        info!("MyApp environment validation passed");
    }
    log_summary(&config);

    info!("Step 4: Deployment");
    info!("{}", rule());

    if args.build_only {
        info!("Building Lambda package only (--build-only)");
        let package = package::build(&config, &env).await?;
        info!("{}", "=".repeat(60));
        info!("BUILD COMPLETE!");
        info!("{}", "=".repeat(60));
        info!("Package: {}", package.display());
        info!("Output Dir: {}", config.output_dir.display());
        return Ok(());
    }

    let real_deploy = !config.local_test_enabled && !config.dry_run;
    let schedule = config.schedule_expression.clone();
    let budget_enabled = config.enable_budget;
    if config.dry_run {
        deploy_with(config, env, DryRunProvisioner::default()).await?;
    } else if config.local_test_enabled {
        deploy_with(config, env, LocalProvisioner).await?;
    } else {
        let provisioner = AwsProvisioner::from_config(&config).await;
        deploy_with(config, env, provisioner).await?;
    }

    if real_deploy {
        info!("MyApp Specific Notes:");
        info!("{}", rule());
        if budget_enabled {
            info!("Budget Email: Check your inbox for SNS subscription confirmation");
        }
        info!("Schedule: {}", schedule);
    }
    Ok(())
}
