use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "deploy",
    about = "Deploy MyApp to AWS Lambda",
    long_about = "Validates the application environment, builds the Lambda package,\n\
                  and creates or updates the IAM role, function, schedule and budget alerts."
)]
pub struct DeployArgs {
    /// Show what would be deployed without calling AWS
    #[arg(long)]
    pub dry_run: bool,
    /// Build the deployment package and stop
    #[arg(long)]
    pub build_only: bool,
    /// Skip application environment validation
    #[arg(long)]
    pub skip_validation: bool,
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
    /// AWS region (defaults to AWS_REGION or ap-southeast-1)
    #[arg(long)]
    pub region: Option<String>,
    /// Lambda function name
    #[arg(long)]
    pub function_name: Option<String>,
    /// Email address for budget alerts
    #[arg(long)]
    pub budget_email: Option<String>,
    /// Monthly budget limit in USD
    #[arg(long)]
    pub budget_limit: Option<f64>,
    /// Name of the AWS budget
    #[arg(long)]
    pub budget_name: Option<String>,
    /// Do not create budget alerts
    #[arg(long)]
    pub no_budget: bool,
    /// Build and run the function locally instead of deploying
    #[arg(long)]
    pub local_lambda: bool,
    /// Workspace directory to build from
    #[arg(long)]
    pub source_dir: Option<PathBuf>,
    /// Directory for the deployment package
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
