use myapp::EnvSnapshot;
use myapp_deployer::config::DeployConfig;
use myapp_deployer::deployer::{Deployer, DeploymentStep};
use myapp_deployer::error::DeployError;
use myapp_deployer::provisioner::{DryRunProvisioner, Provisioner};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct RecordingProvisioner {
    calls: Mutex<Vec<String>>,
    fail_schedule: bool,
}

impl RecordingProvisioner {
    fn record(&self, call: String) {
        self.calls.lock().expect("poisoned mutex").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned mutex").clone()
    }
}

impl Provisioner for &RecordingProvisioner {
    async fn ensure_role(&self, config: &DeployConfig) -> Result<String, DeployError> {
        self.record(format!("role:{}", config.role_name));
        Ok("arn:role".to_string())
    }

    async fn deploy_function(
        &self,
        config: &DeployConfig,
        package: &Path,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<String, DeployError> {
        let keys: Vec<&str> = environment.keys().map(String::as_str).collect();
        self.record(format!(
            "function:{}:{}:{}:{}",
            config.function_name,
            package.display(),
            role_arn,
            keys.join(",")
        ));
        Ok("arn:function".to_string())
    }

    async fn ensure_schedule(&self, config: &DeployConfig, function_arn: &str) -> Result<String, DeployError> {
        self.record(format!("schedule:{}:{}", config.schedule_expression, function_arn));
        if self.fail_schedule {
            return Err(DeployError::Aws {
                operation: "events:PutRule",
                message: "throttled".to_string(),
            });
        }
        Ok("arn:rule".to_string())
    }

    async fn ensure_budget_alerts(&self, config: &DeployConfig) -> Result<(), DeployError> {
        self.record(format!("budget:{}", config.budget_name));
        Ok(())
    }

    async fn run_local_test(
        &self,
        config: &DeployConfig,
        _environment: &BTreeMap<String, String>,
    ) -> Result<(), DeployError> {
        self.record(format!("local:{}", config.function_name));
        Ok(())
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn app_env() -> EnvSnapshot {
    EnvSnapshot::from_pairs([
        ("MYAPP_REQUIRED_VAR", "value"),
        ("MYAPP_SETTING", "setting"),
        ("MYAPP_FEATURE_NEWUI", "true"),
        ("AWS_SECRET_ACCESS_KEY", "do-not-forward"),
    ])
}

fn config() -> DeployConfig {
    DeployConfig {
        budget_email: Some("ops@example.com".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_full_deploy_wires_outputs_between_steps() {
    let provisioner = RecordingProvisioner::default();
    let deployer = Deployer::new(config(), app_env(), &provisioner).with_package(PathBuf::from("dist/myapp.zip"));
    let outcome = block_on(deployer.deploy()).unwrap();

    assert_eq!(
        provisioner.calls(),
        vec![
            "role:myapp-lambda-role".to_string(),
            "function:myapp:dist/myapp.zip:arn:role:MYAPP_FEATURE_NEWUI,MYAPP_REQUIRED_VAR,MYAPP_SETTING".to_string(),
            "schedule:rate(1 hour):arn:function".to_string(),
            "budget:MyApp Budget".to_string(),
        ]
    );
    assert_eq!(outcome.function_arn.as_deref(), Some("arn:function"));
    assert_eq!(outcome.rule_arn.as_deref(), Some("arn:rule"));
    assert_eq!(outcome.completed.len(), 4);
}

#[test]
fn test_failing_step_stops_deployment() {
    let provisioner = RecordingProvisioner {
        fail_schedule: true,
        ..Default::default()
    };
    let deployer = Deployer::new(config(), app_env(), &provisioner).with_package(PathBuf::from("dist/myapp.zip"));
    let err = block_on(deployer.deploy()).unwrap_err();

    match err {
        DeployError::Step { step, .. } => assert_eq!(step, "Schedule"),
        other => panic!("unexpected error {other}"),
    }
    assert!(!provisioner.calls().iter().any(|c| c.starts_with("budget:")));
}

#[test]
fn test_budget_step_skipped_when_disabled() {
    let config = DeployConfig {
        enable_budget: false,
        ..Default::default()
    };
    let provisioner = RecordingProvisioner::default();
    let deployer = Deployer::new(config, app_env(), &provisioner).with_package(PathBuf::from("pkg.zip"));
    assert_eq!(
        deployer.steps(),
        &[
            DeploymentStep::IamSetup,
            DeploymentStep::LambdaFunction,
            DeploymentStep::Schedule
        ]
    );
    block_on(deployer.deploy()).unwrap();
    assert_eq!(provisioner.calls().len(), 3);
}

#[test]
fn test_local_mode_only_runs_locally() {
    let config = DeployConfig {
        local_test_enabled: true,
        ..Default::default()
    };
    let provisioner = RecordingProvisioner::default();
    let deployer = Deployer::new(config, app_env(), &provisioner);
    let outcome = block_on(deployer.deploy()).unwrap();
    assert_eq!(provisioner.calls(), vec!["local:myapp".to_string()]);
    assert!(outcome.package.is_none());
}

#[test]
fn test_schedule_without_function_is_rejected() {
    let provisioner = RecordingProvisioner::default();
    let mut deployer = Deployer::new(config(), app_env(), &provisioner);
    deployer.set_steps(vec![DeploymentStep::Schedule]);
    let err = block_on(deployer.deploy()).unwrap_err();
    assert!(err.to_string().contains("Schedule"));
    assert!(provisioner.calls().is_empty());
}

#[test]
fn test_dry_run_does_not_build() {
    let config = DeployConfig {
        dry_run: true,
        output_dir: PathBuf::from("does-not-exist"),
        ..config()
    };
    let deployer = Deployer::new(config, app_env(), DryRunProvisioner::default());
    let outcome = block_on(deployer.deploy()).unwrap();
    assert_eq!(outcome.package, Some(PathBuf::from("does-not-exist").join("myapp.zip")));
    assert!(!Path::new("does-not-exist").exists());
    assert_eq!(
        outcome.function_arn.as_deref(),
        Some("arn:aws:lambda:ap-southeast-1:000000000000:function:myapp")
    );
}
