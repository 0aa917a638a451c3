use crate::args::DeployArgs;
use crate::error::DeployError;
use myapp::config::{is_truthy, load_first_env_file, EnvFile, EnvSnapshot};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const BUDGET_EMAIL: &str = "MYAPP_BUDGET_EMAIL";
pub const BUDGET_LIMIT: &str = "MYAPP_BUDGET_LIMIT";

/// Variables Lambda reserves for itself; never forwarded to the function.
const RESERVED_PREFIXES: &[&str] = &["AWS_", "LAMBDA_", "_HANDLER", "_X_AMZN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    Arm64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub region: String,
    pub function_name: String,
    pub role_name: String,
    pub schedule_name: String,
    pub schedule_expression: String,
    pub budget_name: String,
    pub budget_email: Option<String>,
    pub budget_limit: f64,
    pub enable_budget: bool,
    pub timeout: i32,
    pub memory_size: i32,
    pub runtime: String,
    pub handler: String,
    pub target: String,
    pub dry_run: bool,
    pub local_test_enabled: bool,
    pub required_env_vars: Vec<String>,
    pub allowed_env_prefixes: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            output_dir: PathBuf::from("dist"),
            region: DEFAULT_REGION.to_string(),
            function_name: "myapp".to_string(),
            role_name: "myapp-lambda-role".to_string(),
            schedule_name: "myapp-schedule".to_string(),
            schedule_expression: "rate(1 hour)".to_string(),
            budget_name: "MyApp Budget".to_string(),
            budget_email: None,
            budget_limit: 10.0,
            enable_budget: true,
            timeout: 300,
            memory_size: 256,
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            target: "x86_64-unknown-linux-gnu".to_string(),
            dry_run: false,
            local_test_enabled: false,
            required_env_vars: vec!["MYAPP_REQUIRED_VAR".to_string(), "MYAPP_SETTING".to_string()],
            allowed_env_prefixes: vec!["MYAPP_FEATURE_".to_string()],
        }
    }
}

fn parse_env<T: FromStr>(env: &EnvSnapshot, key: &str) -> Option<T> {
    let raw = env.get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}

fn deployment_env_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        paths.push(cwd.join(".env.deploy"));
        paths.push(cwd.join("myapp").join(".env.deploy"));
    }
    if let Some(root) = Path::new(env!("CARGO_MANIFEST_DIR")).parent() {
        paths.push(root.join(".env.deploy"));
    }
    paths
}

/// Loads the first `.env.deploy` found without overriding variables that
/// are already set.
pub fn load_deployment_env() -> Option<PathBuf> {
    load_deployment_env_from(&deployment_env_paths())
}

pub fn load_deployment_env_from(paths: &[PathBuf]) -> Option<PathBuf> {
    let loaded = load_first_env_file(paths, false);
    loaded.log(".env.deploy");
    if loaded == EnvFile::NotFound {
        info!("Using command line arguments only");
    }
    loaded.path().map(Path::to_path_buf)
}

impl DeployConfig {
    /// Command line beats environment, environment beats defaults.
    pub fn resolve(args: &DeployArgs, env: &EnvSnapshot) -> Result<Self, DeployError> {
        let mut config = DeployConfig::default();
        config.apply_env_overrides(env);

        if let Some(dir) = &args.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &args.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(region) = &args.region {
            config.region = region.clone();
        }
        if let Some(name) = &args.function_name {
            config.function_name = name.clone();
        }
        if let Some(email) = &args.budget_email {
            config.budget_email = Some(email.clone());
        }
        if let Some(limit) = args.budget_limit {
            config.budget_limit = limit;
        }
        if let Some(name) = &args.budget_name {
            config.budget_name = name.clone();
        }
        config.enable_budget = !args.no_budget;
        config.dry_run |= args.dry_run;
        config.local_test_enabled |= args.local_lambda;

        if config.budget_required() && config.budget_email.is_none() {
            return Err(DeployError::MissingBudgetEmail);
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self, env: &EnvSnapshot) {
        let strings: [(&str, &mut String); 7] = [
            ("AWS_REGION", &mut self.region),
            ("AWS_FUNCTION_NAME", &mut self.function_name),
            ("AWS_ROLE_NAME", &mut self.role_name),
            ("AWS_SCHEDULE_NAME", &mut self.schedule_name),
            ("LAMBDA_RUNTIME", &mut self.runtime),
            ("LAMBDA_HANDLER", &mut self.handler),
            ("SCHEDULE_EXPRESSION", &mut self.schedule_expression),
        ];
        for (key, field) in strings {
            if let Some(v) = env.get(key) {
                *field = v.to_string();
            }
        }
        if let Some(target) = env.get("LAMBDA_TARGET") {
            self.target = target.to_string();
        }

        if let Some(email) = env.get(BUDGET_EMAIL) {
            self.budget_email = Some(email.to_string());
        }
        if let Some(limit) = parse_env(env, BUDGET_LIMIT) {
            self.budget_limit = limit;
        }
        if let Some(timeout) = parse_env(env, "LAMBDA_TIMEOUT") {
            self.timeout = timeout;
        }
        if let Some(memory) = parse_env(env, "LAMBDA_MEMORY_SIZE") {
            self.memory_size = memory;
        }

        if let Some(v) = env.get("DEPLOY_DRY_RUN") {
            self.dry_run = is_truthy(v);
        }
        if let Some(v) = env.get("DEPLOY_LOCAL_LAMBDA") {
            self.local_test_enabled = is_truthy(v);
        }
    }

    /// Budget alerts only apply to real cloud deployments.
    pub fn budget_required(&self) -> bool {
        self.enable_budget && !self.local_test_enabled
    }

    pub fn architecture(&self) -> Architecture {
        if self.target.starts_with("aarch64") {
            Architecture::Arm64
        } else {
            Architecture::X86_64
        }
    }

    pub fn package_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.zip", self.function_name))
    }

    pub fn budget_topic_name(&self) -> String {
        format!("{}-budget-alerts", self.function_name)
    }

    /// Application variables handed to the deployed function: the required
    /// ones plus anything under an allowed prefix.
    pub fn function_environment(&self, env: &EnvSnapshot) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        for key in &self.required_env_vars {
            if let Some(v) = env.get(key) {
                vars.insert(key.clone(), v.to_string());
            }
        }
        for prefix in &self.allowed_env_prefixes {
            for (k, v) in env.with_prefix(prefix) {
                vars.insert(k.to_string(), v.to_string());
            }
        }
        vars.retain(|k, _| !RESERVED_PREFIXES.iter().any(|p| k.starts_with(p)));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn defaults_with_no_budget() {
        let args = DeployArgs {
            no_budget: true,
            ..Default::default()
        };
        let config = DeployConfig::resolve(&args, &EnvSnapshot::default()).unwrap();
        assert_eq!(config.function_name, "myapp");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.schedule_expression, "rate(1 hour)");
        assert_eq!(config.timeout, 300);
        assert_eq!(config.memory_size, 256);
        assert!(!config.enable_budget);
    }

    #[test]
    fn budget_needs_email() {
        let err = DeployConfig::resolve(&DeployArgs::default(), &EnvSnapshot::default()).unwrap_err();
        assert!(matches!(err, DeployError::MissingBudgetEmail));
        assert!(err.to_string().contains("--no-budget"));
    }

    #[test]
    fn local_test_does_not_need_budget_email() {
        let args = DeployArgs {
            local_lambda: true,
            ..Default::default()
        };
        let config = DeployConfig::resolve(&args, &EnvSnapshot::default()).unwrap();
        assert!(config.local_test_enabled);
        assert!(!config.budget_required());
    }

    #[test]
    fn env_overrides_defaults() {
        let env = env(&[
            ("AWS_REGION", "us-west-2"),
            ("AWS_FUNCTION_NAME", "reports"),
            ("MYAPP_BUDGET_EMAIL", "ops@example.com"),
            ("MYAPP_BUDGET_LIMIT", "42.5"),
            ("LAMBDA_TIMEOUT", "60"),
            ("LAMBDA_MEMORY_SIZE", "512"),
            ("SCHEDULE_EXPRESSION", "rate(5 minutes)"),
            ("DEPLOY_DRY_RUN", "yes"),
        ]);
        let config = DeployConfig::resolve(&DeployArgs::default(), &env).unwrap();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.function_name, "reports");
        assert_eq!(config.budget_email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.budget_limit, 42.5);
        assert_eq!(config.timeout, 60);
        assert_eq!(config.memory_size, 512);
        assert_eq!(config.schedule_expression, "rate(5 minutes)");
        assert!(config.dry_run);
    }

    #[test]
    fn args_beat_env() {
        let env = env(&[("AWS_REGION", "us-west-2"), ("MYAPP_BUDGET_LIMIT", "42")]);
        let args = DeployArgs {
            region: Some("eu-central-1".to_string()),
            budget_limit: Some(5.0),
            budget_email: Some("me@example.com".to_string()),
            ..Default::default()
        };
        let config = DeployConfig::resolve(&args, &env).unwrap();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.budget_limit, 5.0);
    }

    #[test]
    fn invalid_numbers_keep_defaults() {
        let env = env(&[("LAMBDA_TIMEOUT", "soon"), ("MYAPP_BUDGET_LIMIT", "lots")]);
        let args = DeployArgs {
            no_budget: true,
            ..Default::default()
        };
        let config = DeployConfig::resolve(&args, &env).unwrap();
        assert_eq!(config.timeout, 300);
        assert_eq!(config.budget_limit, 10.0);
    }

    #[test]
    fn dry_run_flag_survives_false_env() {
        let env = env(&[("DEPLOY_DRY_RUN", "false")]);
        let args = DeployArgs {
            dry_run: true,
            no_budget: true,
            ..Default::default()
        };
        assert!(DeployConfig::resolve(&args, &env).unwrap().dry_run);
    }

    #[test]
    fn function_environment_filters() {
        let env = env(&[
            ("MYAPP_REQUIRED_VAR", "a"),
            ("MYAPP_SETTING", "b"),
            ("MYAPP_FEATURE_NEWUI", "true"),
            ("MYAPP_LOG_DIR", "/tmp/myapp"),
            ("MYAPP_BUDGET_EMAIL", "ops@example.com"),
            ("HOME", "/root"),
        ]);
        let vars = DeployConfig::default().function_environment(&env);
        let keys: Vec<&str> = vars.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["MYAPP_FEATURE_NEWUI", "MYAPP_REQUIRED_VAR", "MYAPP_SETTING"]);
    }

    #[test]
    fn architecture_follows_target() {
        let mut config = DeployConfig::default();
        assert_eq!(config.architecture(), Architecture::X86_64);
        config.target = "aarch64-unknown-linux-gnu".to_string();
        assert_eq!(config.architecture(), Architecture::Arm64);
    }

    #[test]
    fn package_path_uses_function_name() {
        let config = DeployConfig::default();
        assert_eq!(config.package_path(), PathBuf::from("dist").join("myapp.zip"));
    }

    #[test]
    fn deployment_env_never_overrides_process_values() {
        // Loading writes to the process environment; the names are unique
        // to this test and removed again below.
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env.deploy");
        std::fs::write(
            &file,
            "MYAPP_DEPLOY_TEST_REGION=us-east-1\nMYAPP_DEPLOY_TEST_FRESH=from-file\n",
        )
        .unwrap();
        env::set_var("MYAPP_DEPLOY_TEST_REGION", "eu-west-1");

        let loaded = load_deployment_env_from(&[dir.path().join("missing"), file.clone()]);
        let region = env::var("MYAPP_DEPLOY_TEST_REGION");
        let fresh = env::var("MYAPP_DEPLOY_TEST_FRESH");
        env::remove_var("MYAPP_DEPLOY_TEST_REGION");
        env::remove_var("MYAPP_DEPLOY_TEST_FRESH");

        assert_eq!(loaded, Some(file));
        assert_eq!(region.as_deref(), Ok("eu-west-1"));
        assert_eq!(fresh.as_deref(), Ok("from-file"));
        assert_eq!(load_deployment_env_from(&[dir.path().join("missing")]), None);
    }
}
