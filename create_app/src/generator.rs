use crate::names::{AppNames, TEMPLATE_NAME};
use crate::GeneratorError;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

const GENERATOR_CRATE: &str = "create_app";
const REQUIRED_FILES: &[&str] = &[
    "Cargo.toml",
    "myapp/Cargo.toml",
    "myapp/src/lib.rs",
    "myapp_deployer/src/main.rs",
];
const RECOMMENDED_FILES: &[&str] = &["README.md"];
const SKIPPED_DIRS: &[&str] = &["target", "dist", "node_modules", GENERATOR_CRATE];

/// What to do when the target directory already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingTarget {
    Fail,
    /// Write over existing files, keeping anything else in the directory.
    Overwrite,
    /// Remove the directory before generating.
    Replace,
}

pub struct Generator {
    root: PathBuf,
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref())
}

/// Drops the generator crate from the workspace member list of the root
/// manifest, since it is not copied.
fn strip_generator_member(manifest: &str) -> String {
    let quoted = format!("\"{}\"", GENERATOR_CRATE);
    manifest
        .replace(&format!(", {}", quoted), "")
        .replace(&format!("{}, ", quoted), "")
}

const GENERATOR_README_SECTION: &str = "## New app";

/// Drops the README parts that describe the generator: its layout entry and
/// the section on creating a new app.
fn strip_generator_docs(readme: &str) -> String {
    let layout_entry = format!("- `{}`", GENERATOR_CRATE);
    let mut in_section = false;
    let mut out = String::with_capacity(readme.len());
    for line in readme.split_inclusive('\n') {
        if line.starts_with("## ") {
            in_section = line.trim_end() == GENERATOR_README_SECTION;
        }
        if in_section || line.starts_with(&layout_entry) {
            continue;
        }
        out.push_str(line);
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn env_example(names: &AppNames) -> String {
    format!(
        "# {display} Configuration\n\
         # Copy this file to .env and fill in your values\n\
         \n\
         # Required\n\
         {upper}_REQUIRED_VAR=your_value_here\n\
         \n\
         # Optional\n\
         {upper}_SETTING=default_value\n\
         {upper}_FEATURE_EXAMPLE=false\n\
         {upper}_LOG_DIR=logs\n",
        display = names.display,
        upper = names.upper,
    )
}

fn deploy_env_example(names: &AppNames) -> String {
    format!(
        "# {display} Deployment Configuration\n\
         # Copy this file to .env.deploy and fill in your values\n\
         \n\
         AWS_REGION=ap-southeast-1\n\
         AWS_FUNCTION_NAME={lower}\n\
         AWS_ROLE_NAME={lower}-lambda-role\n\
         AWS_SCHEDULE_NAME={lower}-schedule\n\
         SCHEDULE_EXPRESSION=rate(1 hour)\n\
         \n\
         LAMBDA_RUNTIME=provided.al2023\n\
         LAMBDA_HANDLER=bootstrap\n\
         LAMBDA_TARGET=x86_64-unknown-linux-gnu\n\
         LAMBDA_TIMEOUT=300\n\
         LAMBDA_MEMORY_SIZE=256\n\
         \n\
         # Budget alerts\n\
         {upper}_BUDGET_EMAIL=your-email@example.com\n\
         {upper}_BUDGET_LIMIT=10.0\n",
        display = names.display,
        lower = names.lower,
        upper = names.upper,
    )
}

const GITIGNORE: &str = "/target\n\
/dist\n\
\n\
# Environment\n\
.env\n\
.env.deploy\n\
\n\
# Logs\n\
logs/\n\
*.log\n\
\n\
# Editors\n\
.idea/\n\
.vscode/\n\
*.swp\n\
\n\
# OS\n\
.DS_Store\n\
Thumbs.db\n";

impl Generator {
    /// Finds the boilerplate root: `dir` itself or its parent, whichever holds
    /// the `myapp` crate.
    pub fn locate(dir: &Path) -> Result<Self, GeneratorError> {
        let marker = Path::new(TEMPLATE_NAME).join("Cargo.toml");
        [Some(dir), dir.parent()]
            .into_iter()
            .flatten()
            .find(|candidate| candidate.join(&marker).is_file())
            .map(|root| Self {
                root: root.to_path_buf(),
            })
            .ok_or_else(|| GeneratorError::BoilerplateNotFound(dir.to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate_boilerplate(&self) -> Result<(), GeneratorError> {
        let missing: Vec<String> = REQUIRED_FILES
            .iter()
            .filter(|f| !self.root.join(f).is_file())
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(GeneratorError::MissingFiles(missing));
        }
        for file in RECOMMENDED_FILES {
            if !self.root.join(file).is_file() {
                warn!("Recommended file missing from boilerplate: {}", file);
            }
        }
        info!("Boilerplate found at {}", self.root.display());
        Ok(())
    }

    /// Copies the boilerplate into `target` with every name replaced. When
    /// generation fails and `target` did not exist before, it is removed.
    pub fn generate(
        &self,
        names: &AppNames,
        target: &Path,
        existing: ExistingTarget,
    ) -> Result<(), GeneratorError> {
        let existed = target.exists();
        if existed && self.root.canonicalize()?.starts_with(target.canonicalize()?) {
            return Err(GeneratorError::TargetOverlapsBoilerplate(target.to_path_buf()));
        }
        if existed {
            match existing {
                ExistingTarget::Fail => return Err(GeneratorError::TargetExists(target.to_path_buf())),
                ExistingTarget::Overwrite => warn!("Writing into existing directory {}", target.display()),
                ExistingTarget::Replace => {
                    warn!("Removing existing directory {}", target.display());
                    fs::remove_dir_all(target)?;
                }
            }
        }

        let result = self.copy_tree(names, target).and_then(|()| self.create_env_examples(names, target));
        if result.is_err() && !existed && target.exists() {
            if let Err(e) = fs::remove_dir_all(target) {
                warn!("Could not clean up {}: {}", target.display(), e);
            }
        }
        result
    }

    fn copy_tree(&self, names: &AppNames, target: &Path) -> Result<(), GeneratorError> {
        fs::create_dir_all(target)?;
        let target_abs = target.canonicalize()?;

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped(e));
        let mut copied = 0usize;
        for entry in walker {
            let entry = entry?;
            // A target inside the boilerplate must not copy into itself.
            if entry.path().canonicalize()?.starts_with(&target_abs) {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let destination = target.join(rename_path(names, relative));

            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)?;
            } else if entry.file_type().is_file() {
                transform_file(names, entry.path(), &destination, relative)?;
                copied += 1;
            }
        }
        info!("Copied {} files into {}", copied, target.display());
        Ok(())
    }

    pub fn create_env_examples(&self, names: &AppNames, target: &Path) -> Result<(), GeneratorError> {
        let app_dir = target.join(&names.lower);
        fs::create_dir_all(&app_dir)?;
        fs::write(app_dir.join(".env.example"), env_example(names))?;
        fs::write(target.join(".env.deploy.example"), deploy_env_example(names))?;
        fs::write(target.join(".gitignore"), GITIGNORE)?;
        info!("Created .env.example, .env.deploy.example and .gitignore");
        Ok(())
    }
}

fn rename_path(names: &AppNames, relative: &Path) -> PathBuf {
    relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => match part.to_str() {
                Some(s) => names.replace_content(s).into(),
                None => part.to_os_string(),
            },
            other => other.as_os_str().to_os_string(),
        })
        .collect()
}

fn transform_file(
    names: &AppNames,
    source: &Path,
    destination: &Path,
    relative: &Path,
) -> Result<(), GeneratorError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::read_to_string(source) {
        Ok(content) => {
            let content = if relative == Path::new("Cargo.toml") {
                strip_generator_member(&content)
            } else if relative == Path::new("README.md") {
                strip_generator_docs(&content)
            } else {
                content
            };
            fs::write(destination, names.replace_content(&content))?;
            fs::set_permissions(destination, fs::metadata(source)?.permissions())?;
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            debug!(
                "Copying binary file {}",
                source.file_name().unwrap_or(OsStr::new("")).to_string_lossy()
            );
            fs::copy(source, destination)?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Instructions printed after a successful generation.
pub fn next_steps(names: &AppNames, target: &Path) -> Vec<String> {
    vec![
        format!("cd {}", target.display()),
        format!("cp {}/.env.example {}/.env", names.lower, names.lower),
        "cp .env.deploy.example .env.deploy".to_string(),
        format!("Edit {}/src/service.rs with your business logic", names.lower),
        format!("cargo run -p {} --bin local_runner", names.lower),
        format!("cargo run -p {}_deployer --bin deploy -- --dry-run", names.lower),
        format!("cargo run -p {}_deployer --bin deploy", names.lower),
    ]
}
