use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ENV_PREFIX: &str = "MYAPP_";
pub const FEATURE_PREFIX: &str = "MYAPP_FEATURE_";
pub const SETTING: &str = "MYAPP_SETTING";
pub const LOG_DIR: &str = "MYAPP_LOG_DIR";
pub const DEFAULT_SETTING: &str = "default_value";

/// Variables the function refuses to run without.
pub const REQUIRED_VARS: &[&str] = &["MYAPP_REQUIRED_VAR"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),
}

/// A point-in-time copy of the environment.
///
/// Everything that reads configuration goes through a snapshot so the
/// process environment is only touched once, at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        let vars = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns the value when it is set and not empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.vars
            .iter()
            .filter(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

pub fn missing_required_vars<'a>(env: &EnvSnapshot, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    required
        .into_iter()
        .filter(|var| !env.contains(var))
        .map(str::to_string)
        .collect()
}

fn application_env_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new(env!("CARGO_MANIFEST_DIR")).join(".env")];
    if let Ok(cwd) = env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join("myapp").join(".env"));
    }
    paths
}

/// Outcome of looking for an env file. Nothing is logged while loading so
/// callers can report it once their subscriber is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    NotFound,
    Invalid { path: PathBuf, reason: String },
}

impl EnvFile {
    pub fn path(&self) -> Option<&Path> {
        match self {
            EnvFile::Loaded(path) => Some(path),
            _ => None,
        }
    }

    pub fn log(&self, label: &str) {
        match self {
            EnvFile::Loaded(path) => info!("Loaded {} from {}", label, path.display()),
            EnvFile::NotFound => info!("No {} file found, using system environment", label),
            EnvFile::Invalid { path, reason } => warn!("Failed to load {} from {}: {}", label, path.display(), reason),
        }
    }
}

pub const APPLICATION_ENV: &str = "application .env";

/// Loads the first application `.env` found, overriding the process
/// environment, without logging.
pub fn application_env_file() -> EnvFile {
    load_first_env_file(&application_env_paths(), true)
}

pub fn load_application_env() -> Option<PathBuf> {
    let file = application_env_file();
    file.log(APPLICATION_ENV);
    file.path().map(Path::to_path_buf)
}

/// Loads the first existing file of `paths`. With `overwrite` its values
/// replace variables already set in the process.
pub fn load_first_env_file(paths: &[PathBuf], overwrite: bool) -> EnvFile {
    let Some(path) = paths.iter().find(|p| p.is_file()) else {
        return EnvFile::NotFound;
    };
    let loaded = if overwrite {
        dotenvy::from_path_override(path)
    } else {
        dotenvy::from_path(path)
    };
    match loaded {
        Ok(()) => EnvFile::Loaded(path.clone()),
        Err(e) => EnvFile::Invalid {
            path: path.clone(),
            reason: e.to_string(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_setting: String,
    pub feature_flags: BTreeMap<String, bool>,
    env: EnvSnapshot,
}

impl Config {
    pub fn from_env() -> Self {
        load_application_env();
        Self::from_snapshot(EnvSnapshot::capture())
    }

    pub fn from_snapshot(env: EnvSnapshot) -> Self {
        let app_setting = env.get(SETTING).unwrap_or(DEFAULT_SETTING).to_string();
        debug!("Using app_setting: {}", app_setting);

        let feature_flags: BTreeMap<String, bool> = env
            .with_prefix(FEATURE_PREFIX)
            .map(|(k, v)| (k[FEATURE_PREFIX.len()..].to_lowercase(), is_truthy(v)))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        for (name, enabled) in &feature_flags {
            debug!("Feature flag {}: {}", name, enabled);
        }

        info!("Configuration loaded with app_setting: {}", app_setting);
        Self { app_setting, feature_flags, env }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = missing_required_vars(&self.env, REQUIRED_VARS.iter().copied());
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }
        info!("Configuration validation passed");
        Ok(())
    }

    /// Looks up `MYAPP_<KEY>`.
    pub fn get_setting(&self, key: &str) -> Option<&str> {
        self.env.get(&format!("{}{}", ENV_PREFIX, key.to_uppercase()))
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.feature_flags.get(&name.to_lowercase()).copied().unwrap_or(false)
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_snapshot(EnvSnapshot::default());
        assert_eq!(config.app_setting, DEFAULT_SETTING);
        assert!(config.feature_flags.is_empty());
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let env = EnvSnapshot::from_pairs([(SETTING, ""), ("MYAPP_REQUIRED_VAR", "")]);
        let config = Config::from_snapshot(env);
        assert_eq!(config.app_setting, DEFAULT_SETTING);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingVars(vec!["MYAPP_REQUIRED_VAR".to_string()]))
        );
    }

    #[test]
    fn feature_flags_are_lowercased_and_parsed() {
        let env = EnvSnapshot::from_pairs([
            ("MYAPP_FEATURE_NEWUI", "Yes"),
            ("MYAPP_FEATURE_EXAMPLE", "1"),
            ("MYAPP_FEATURE_LEGACY", "off"),
            ("OTHER_FEATURE_X", "true"),
        ]);
        let config = Config::from_snapshot(env);
        assert_eq!(config.feature_flags.len(), 3);
        assert!(config.feature_enabled("newui"));
        assert!(config.feature_enabled("EXAMPLE"));
        assert!(!config.feature_enabled("legacy"));
        assert!(!config.feature_enabled("x"));
    }

    #[test]
    fn get_setting_uppercases_key() {
        let env = EnvSnapshot::from_pairs([("MYAPP_API_URL", "https://example.com")]);
        let config = Config::from_snapshot(env);
        assert_eq!(config.get_setting("api_url"), Some("https://example.com"));
        assert_eq!(config.get_setting("missing"), None);
    }

    #[test]
    fn validate_passes_with_required_var() {
        let env = EnvSnapshot::from_pairs([("MYAPP_REQUIRED_VAR", "x")]);
        assert!(Config::from_snapshot(env).validate().is_ok());
    }

    #[test]
    fn truthy_values() {
        for v in ["true", "TRUE", "1", "yes", "Yes"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["false", "0", "no", "", "y"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    /// Loading `.env` files writes to the process environment; every test
    /// uses its own variable names and removes them afterwards.
    struct ProcessVars(&'static [&'static str]);

    impl Drop for ProcessVars {
        fn drop(&mut self) {
            for var in self.0 {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn first_existing_env_file_wins() {
        let _vars = ProcessVars(&["MYAPP_TEST_FIRST_FILE", "MYAPP_TEST_SECOND_FILE"]);
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.env");
        let second = dir.path().join("b.env");
        std::fs::write(&first, "MYAPP_TEST_FIRST_FILE=one\n").unwrap();
        std::fs::write(&second, "MYAPP_TEST_SECOND_FILE=two\n").unwrap();
        let missing = dir.path().join("missing.env");

        let loaded = load_first_env_file(&[missing, first.clone(), second], false);
        assert_eq!(loaded, EnvFile::Loaded(first));
        assert_eq!(env::var("MYAPP_TEST_FIRST_FILE").as_deref(), Ok("one"));
        assert!(env::var("MYAPP_TEST_SECOND_FILE").is_err());
    }

    #[test]
    fn application_env_overrides_process_values() {
        let _vars = ProcessVars(&["MYAPP_TEST_OVERRIDDEN"]);
        env::set_var("MYAPP_TEST_OVERRIDDEN", "from-process");
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        std::fs::write(&file, "MYAPP_TEST_OVERRIDDEN=from-file\n").unwrap();

        assert_eq!(load_first_env_file(&[file.clone()], true), EnvFile::Loaded(file));
        assert_eq!(env::var("MYAPP_TEST_OVERRIDDEN").as_deref(), Ok("from-file"));
    }

    #[test]
    fn missing_and_invalid_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_first_env_file(&[dir.path().join(".env")], true), EnvFile::NotFound);

        let broken = dir.path().join("broken.env");
        std::fs::write(&broken, "MYAPP_TEST_BROKEN='unterminated\n").unwrap();
        match load_first_env_file(&[broken.clone()], true) {
            EnvFile::Invalid { path, .. } => assert_eq!(path, broken),
            other => panic!("unexpected {other:?}"),
        }
    }
}
