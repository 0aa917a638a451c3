use crate::config::DeployConfig;
use myapp::config::{missing_required_vars, EnvSnapshot, FEATURE_PREFIX};
use regex::Regex;
use tracing::{error, info};

/// Checks the application variables the function needs at runtime.
pub struct EnvironmentValidator<'a> {
    required_vars: &'a [String],
}

impl<'a> EnvironmentValidator<'a> {
    pub fn new(required_vars: &'a [String]) -> Self {
        Self { required_vars }
    }

    pub fn validate(&self, env: &EnvSnapshot) -> bool {
        info!("Validating MyApp environment variables...");

        let missing = missing_required_vars(env, self.required_vars.iter().map(String::as_str));
        if !missing.is_empty() {
            error!("Missing environment variables: {}", missing.join(", "));
            info!("Please check your .env file");
            return false;
        }
        info!("All required environment variables found");

        let flags = env.with_prefix(FEATURE_PREFIX).count();
        if flags > 0 {
            info!("Found {} feature flag(s)", flags);
        }
        true
    }
}

/// Checks deployment settings against the limits AWS enforces, so mistakes
/// surface before anything is created.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn problems(config: &DeployConfig) -> Vec<String> {
        let mut problems = Vec::new();

        if !valid_function_name(&config.function_name) {
            problems.push(format!(
                "function name '{}' must be 1-64 letters, digits, '-' or '_'",
                config.function_name
            ));
        }
        if !(1..=900).contains(&config.timeout) {
            problems.push(format!("timeout {}s must be between 1 and 900", config.timeout));
        }
        if !(128..=10240).contains(&config.memory_size) {
            problems.push(format!(
                "memory size {}MB must be between 128 and 10240",
                config.memory_size
            ));
        }
        if !valid_schedule_expression(&config.schedule_expression) {
            problems.push(format!(
                "schedule expression '{}' must be rate(N unit) or cron(...)",
                config.schedule_expression
            ));
        }
        if config.enable_budget && !(config.budget_limit > 0.0 && config.budget_limit.is_finite()) {
            problems.push(format!("budget limit {} must be positive", config.budget_limit));
        }
        if let Some(email) = &config.budget_email {
            if !valid_email(email) {
                problems.push(format!("budget email '{}' is not an email address", email));
            }
        }
        problems
    }

    pub fn validate(config: &DeployConfig) -> bool {
        info!("Validating MyApp configuration...");
        let problems = Self::problems(config);
        for p in &problems {
            error!("{}", p);
        }
        if problems.is_empty() {
            info!("Configuration validation passed");
        }
        problems.is_empty()
    }
}

fn matches(pattern: &str, value: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false)
}

pub fn valid_function_name(name: &str) -> bool {
    matches(r"^[A-Za-z0-9_-]{1,64}$", name)
}

pub fn valid_email(email: &str) -> bool {
    matches(r"^[^@\s]+@[^@\s]+\.[^@\s]+$", email)
}

/// `rate(1 hour)`, `rate(5 minutes)`, or a six-field `cron(...)`.
pub fn valid_schedule_expression(expr: &str) -> bool {
    let rate = Regex::new(r"^rate\((\d+) (minute|minutes|hour|hours|day|days)\)$");
    if let Ok(re) = rate {
        if let Some(caps) = re.captures(expr.trim()) {
            let value: u64 = caps[1].parse().unwrap_or(0);
            let plural = caps[2].ends_with('s');
            return value >= 1 && (value == 1) != plural;
        }
    }
    let cron = expr
        .trim()
        .strip_prefix("cron(")
        .and_then(|rest| rest.strip_suffix(')'));
    match cron {
        Some(fields) => fields.split_whitespace().count() == 6,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_validator_reports_missing() {
        let required = vec!["MYAPP_REQUIRED_VAR".to_string(), "MYAPP_SETTING".to_string()];
        let validator = EnvironmentValidator::new(&required);
        let env = EnvSnapshot::from_pairs([("MYAPP_REQUIRED_VAR", "x")]);
        assert!(!validator.validate(&env));

        let env = EnvSnapshot::from_pairs([
            ("MYAPP_REQUIRED_VAR", "x"),
            ("MYAPP_SETTING", "y"),
            ("MYAPP_FEATURE_A", "true"),
        ]);
        assert!(validator.validate(&env));
    }

    #[test]
    fn schedule_expressions() {
        for ok in [
            "rate(1 hour)",
            "rate(5 minutes)",
            "rate(2 days)",
            "rate(1 minute)",
            "cron(0 12 * * ? *)",
            "cron(0/15 * * * ? *)",
        ] {
            assert!(valid_schedule_expression(ok), "{ok}");
        }
        for bad in [
            "rate(1 hours)",
            "rate(5 minute)",
            "rate(0 minutes)",
            "rate(1 week)",
            "cron(0 12 * * ?)",
            "every hour",
            "",
        ] {
            assert!(!valid_schedule_expression(bad), "{bad}");
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::problems(&DeployConfig::default()).is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let config = DeployConfig {
            function_name: "my app".to_string(),
            timeout: 0,
            memory_size: 64,
            schedule_expression: "hourly".to_string(),
            budget_limit: -1.0,
            budget_email: Some("nobody".to_string()),
            ..Default::default()
        };
        assert_eq!(ConfigValidator::problems(&config).len(), 6);
    }

    #[test]
    fn budget_limit_ignored_when_disabled() {
        let config = DeployConfig {
            enable_budget: false,
            budget_limit: 0.0,
            ..Default::default()
        };
        assert!(ConfigValidator::validate(&config));
    }

    #[test]
    fn emails() {
        assert!(valid_email("ops@example.com"));
        assert!(!valid_email("ops@example"));
        assert!(!valid_email("ops example@x.com"));
    }
}
