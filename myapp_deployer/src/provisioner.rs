use crate::config::DeployConfig;
use crate::error::DeployError;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

pub const LOCAL_RUNNER: &str = "local_runner";

/// The cloud-facing half of a deployment. Every operation is create-or-update
/// so re-running a deployment converges instead of failing.
#[allow(async_fn_in_trait)]
pub trait Provisioner {
    /// Returns the role ARN.
    async fn ensure_role(&self, config: &DeployConfig) -> Result<String, DeployError>;

    /// Returns the function ARN.
    async fn deploy_function(
        &self,
        config: &DeployConfig,
        package: &Path,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<String, DeployError>;

    /// Returns the schedule rule ARN.
    async fn ensure_schedule(&self, config: &DeployConfig, function_arn: &str) -> Result<String, DeployError>;

    async fn ensure_budget_alerts(&self, config: &DeployConfig) -> Result<(), DeployError>;

    async fn run_local_test(
        &self,
        config: &DeployConfig,
        environment: &BTreeMap<String, String>,
    ) -> Result<(), DeployError> {
        run_local_runner(config, environment).await
    }
}

/// Runs the function's local runner from the workspace with the function's
/// environment.
pub async fn run_local_runner(
    config: &DeployConfig,
    environment: &BTreeMap<String, String>,
) -> Result<(), DeployError> {
    info!("Running {} locally", config.function_name);
    let status = Command::new("cargo")
        .args(["run", "-p", crate::package::FUNCTION_PACKAGE, "--bin", LOCAL_RUNNER])
        .current_dir(&config.source_dir)
        .envs(environment)
        .status()
        .await
        .map_err(|e| DeployError::LocalTest(format!("failed to execute cargo: {e}")))?;
    if !status.success() {
        return Err(DeployError::LocalTest(format!("local runner exited with {status}")));
    }
    info!("Local test passed");
    Ok(())
}

/// Reports what a deployment would do without touching AWS.
pub struct DryRunProvisioner {
    account_id: String,
}

impl Default for DryRunProvisioner {
    fn default() -> Self {
        Self {
            account_id: "000000000000".to_string(),
        }
    }
}

impl Provisioner for DryRunProvisioner {
    async fn ensure_role(&self, config: &DeployConfig) -> Result<String, DeployError> {
        info!("[dry-run] would create or reuse IAM role {}", config.role_name);
        info!("[dry-run] would attach AWSLambdaBasicExecutionRole");
        Ok(format!("arn:aws:iam::{}:role/{}", self.account_id, config.role_name))
    }

    async fn deploy_function(
        &self,
        config: &DeployConfig,
        package: &Path,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<String, DeployError> {
        info!(
            "[dry-run] would create or update function {} from {} ({}, {} MB, {} s, role {})",
            config.function_name,
            package.display(),
            config.runtime,
            config.memory_size,
            config.timeout,
            role_arn
        );
        let names: Vec<&str> = environment.keys().map(String::as_str).collect();
        info!("[dry-run] function environment: {}", names.join(", "));
        Ok(format!(
            "arn:aws:lambda:{}:{}:function:{}",
            config.region, self.account_id, config.function_name
        ))
    }

    async fn ensure_schedule(&self, config: &DeployConfig, function_arn: &str) -> Result<String, DeployError> {
        info!(
            "[dry-run] would schedule {} with {} as rule {}",
            function_arn, config.schedule_expression, config.schedule_name
        );
        Ok(format!(
            "arn:aws:events:{}:{}:rule/{}",
            config.region, self.account_id, config.schedule_name
        ))
    }

    async fn ensure_budget_alerts(&self, config: &DeployConfig) -> Result<(), DeployError> {
        info!(
            "[dry-run] would create budget '{}' at ${:.2}/month alerting {} via topic {}",
            config.budget_name,
            config.budget_limit,
            config.budget_email.as_deref().unwrap_or("<no email>"),
            config.budget_topic_name()
        );
        Ok(())
    }

    async fn run_local_test(
        &self,
        config: &DeployConfig,
        environment: &BTreeMap<String, String>,
    ) -> Result<(), DeployError> {
        info!(
            "[dry-run] would run {} locally with {} variable(s)",
            config.function_name,
            environment.len()
        );
        Ok(())
    }
}

/// Used with `--local-lambda`: only the local test step is available.
pub struct LocalProvisioner;

fn cloud_unavailable() -> DeployError {
    DeployError::StepOrder("cloud steps are not available in local test mode")
}

impl Provisioner for LocalProvisioner {
    async fn ensure_role(&self, _config: &DeployConfig) -> Result<String, DeployError> {
        Err(cloud_unavailable())
    }

    async fn deploy_function(
        &self,
        _config: &DeployConfig,
        _package: &Path,
        _role_arn: &str,
        _environment: &BTreeMap<String, String>,
    ) -> Result<String, DeployError> {
        Err(cloud_unavailable())
    }

    async fn ensure_schedule(&self, _config: &DeployConfig, _function_arn: &str) -> Result<String, DeployError> {
        Err(cloud_unavailable())
    }

    async fn ensure_budget_alerts(&self, _config: &DeployConfig) -> Result<(), DeployError> {
        Err(cloud_unavailable())
    }
}
