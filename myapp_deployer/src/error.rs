use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(
        "Budget enforcement requires an email address.\n\
         Provide it via:\n  \
         - Command line: --budget-email you@example.com\n  \
         - Environment: MYAPP_BUDGET_EMAIL=you@example.com\n  \
         - .env.deploy file: MYAPP_BUDGET_EMAIL=you@example.com\n  \
         - Or disable budget: --no-budget"
    )]
    MissingBudgetEmail,
    #[error("{0} validation failed")]
    Validation(&'static str),
    #[error("build failed: {0}")]
    Build(String),
    #[error("step '{step}' failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<DeployError>,
    },
    #[error("{0}")]
    StepOrder(&'static str),
    #[error("AWS {operation} failed: {message}")]
    Aws { operation: &'static str, message: String },
    #[error("local test failed: {0}")]
    LocalTest(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Wraps an SDK error, keeping the whole cause chain in the message.
    pub fn aws<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error,
    {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        DeployError::Aws { operation, message }
    }
}
