//! Creates a new Lambda app from the MyApp boilerplate by copying the
//! workspace and renaming every `myapp` form to the new app's names.

pub mod generator;
pub mod names;

pub use generator::{ExistingTarget, Generator};
pub use names::{validate_app_name, AppNames};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("no MyApp boilerplate (myapp/Cargo.toml) found in {0} or its parent")]
    BoilerplateNotFound(PathBuf),
    #[error("boilerplate is missing required files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),
    #[error("invalid app name '{0}': use lowercase letters, digits and underscores, starting with a letter")]
    InvalidName(String),
    #[error("an app name is required with --quick")]
    NameRequired,
    #[error("'{0}' is a reserved name")]
    ReservedName(String),
    #[error("target directory {0} already exists")]
    TargetExists(PathBuf),
    #[error("target directory {0} contains the boilerplate itself")]
    TargetOverlapsBoilerplate(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}
