use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::package;
use crate::provisioner::Provisioner;
use myapp::config::EnvSnapshot;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStep {
    IamSetup,
    LambdaFunction,
    Schedule,
    BudgetAlerts,
    LocalTest,
}

impl DeploymentStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::IamSetup => "IAM Setup",
            Self::LambdaFunction => "Lambda Function",
            Self::Schedule => "Schedule",
            Self::BudgetAlerts => "Budget Alerts",
            Self::LocalTest => "Local Test",
        }
    }
}

impl Display for DeploymentStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeploymentOutcome {
    pub package: Option<PathBuf>,
    pub role_arn: Option<String>,
    pub function_arn: Option<String>,
    pub rule_arn: Option<String>,
    pub completed: Vec<DeploymentStep>,
}

/// Local test mode runs only the local test; otherwise IAM, function and
/// schedule, plus budget alerts when enabled.
pub fn default_steps(config: &DeployConfig) -> Vec<DeploymentStep> {
    if config.local_test_enabled {
        return vec![DeploymentStep::LocalTest];
    }
    let mut steps = vec![
        DeploymentStep::IamSetup,
        DeploymentStep::LambdaFunction,
        DeploymentStep::Schedule,
    ];
    if config.enable_budget {
        steps.push(DeploymentStep::BudgetAlerts);
    }
    steps
}

pub struct Deployer<P> {
    config: DeployConfig,
    env: EnvSnapshot,
    provisioner: P,
    steps: Vec<DeploymentStep>,
    prebuilt: Option<PathBuf>,
}

impl<P: Provisioner> Deployer<P> {
    pub fn new(config: DeployConfig, env: EnvSnapshot, provisioner: P) -> Self {
        let steps = default_steps(&config);
        Self {
            config,
            env,
            provisioner,
            steps,
            prebuilt: None,
        }
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn set_steps(&mut self, steps: Vec<DeploymentStep>) {
        self.steps = steps;
    }

    /// Deploys an existing package instead of building one.
    pub fn with_package(mut self, package: PathBuf) -> Self {
        self.prebuilt = Some(package);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub async fn build(&self) -> Result<PathBuf, DeployError> {
        match &self.prebuilt {
            Some(path) => Ok(path.clone()),
            None => package::build(&self.config, &self.env).await,
        }
    }

    fn needs_package(&self) -> bool {
        self.steps.contains(&DeploymentStep::LambdaFunction)
    }

    pub async fn deploy(&self) -> Result<DeploymentOutcome, DeployError> {
        let mut outcome = DeploymentOutcome::default();

        if self.needs_package() {
            outcome.package = Some(if self.config.dry_run && self.prebuilt.is_none() {
                let path = self.config.package_path();
                info!("[dry-run] would build package {}", path.display());
                path
            } else {
                self.build().await?
            });
        }

        let environment = self.config.function_environment(&self.env);
        let total = self.steps.len();
        for (i, step) in self.steps.iter().copied().enumerate() {
            info!("Step {}/{}: {}", i + 1, total, step);
            self.run_step(step, &environment, &mut outcome)
                .await
                .map_err(|e| DeployError::Step {
                    step: step.name(),
                    source: Box::new(e),
                })?;
            outcome.completed.push(step);
        }

        self.log_summary(&outcome);
        Ok(outcome)
    }

    async fn run_step(
        &self,
        step: DeploymentStep,
        environment: &BTreeMap<String, String>,
        outcome: &mut DeploymentOutcome,
    ) -> Result<(), DeployError> {
        let config = &self.config;
        match step {
            DeploymentStep::IamSetup => {
                let arn = self.provisioner.ensure_role(config).await?;
                info!("Role ready: {}", arn);
                outcome.role_arn = Some(arn);
            }
            DeploymentStep::LambdaFunction => {
                let role_arn = match &outcome.role_arn {
                    Some(arn) => arn.clone(),
                    None => self.provisioner.ensure_role(config).await?,
                };
                let package = match &outcome.package {
                    Some(p) => p.clone(),
                    None => self.build().await?,
                };
                let arn = self
                    .provisioner
                    .deploy_function(config, &package, &role_arn, environment)
                    .await?;
                info!("Function ready: {}", arn);
                outcome.role_arn = Some(role_arn);
                outcome.function_arn = Some(arn);
            }
            DeploymentStep::Schedule => {
                let function_arn = outcome.function_arn.clone().ok_or_else(|| {
                    DeployError::StepOrder("Schedule needs Lambda Function to run first")
                })?;
                let arn = self.provisioner.ensure_schedule(config, &function_arn).await?;
                info!("Schedule ready: {} ({})", arn, config.schedule_expression);
                outcome.rule_arn = Some(arn);
            }
            DeploymentStep::BudgetAlerts => {
                self.provisioner.ensure_budget_alerts(config).await?;
                info!("Budget alerts ready: {}", config.budget_name);
            }
            DeploymentStep::LocalTest => {
                self.provisioner.run_local_test(config, environment).await?;
            }
        }
        Ok(())
    }

    fn log_summary(&self, outcome: &DeploymentOutcome) {
        info!("{}", "=".repeat(60));
        if self.config.dry_run {
            info!("DRY RUN COMPLETE - nothing was changed");
        } else {
            info!("DEPLOYMENT COMPLETE!");
        }
        info!("{}", "=".repeat(60));
        if let Some(p) = &outcome.package {
            info!("Package: {}", p.display());
        }
        if let Some(arn) = &outcome.function_arn {
            info!("Function: {}", arn);
        }
        if let Some(arn) = &outcome.rule_arn {
            info!("Schedule: {}", arn);
        }
        if !self.config.enable_budget && !self.config.local_test_enabled {
            warn!("Budget alerts are disabled");
        }
    }
}
