use crate::config::{Architecture, DeployConfig};
use crate::error::DeployError;
use crate::policy::{budget_topic_policy, lambda_trust_policy, LAMBDA_BASIC_EXECUTION_POLICY};
use crate::provisioner::Provisioner;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_budgets as budgets;
use aws_sdk_eventbridge as events;
use aws_sdk_iam as iam;
use aws_sdk_lambda as lambda;
use aws_sdk_sns as sns;
use aws_sdk_sts as sts;
use budgets::types::{
    Budget, BudgetType, ComparisonOperator, Notification, NotificationType, NotificationWithSubscribers,
    Spend, Subscriber, SubscriptionType, ThresholdType, TimeUnit,
};
use events::types::{RuleState, Target};
use lambda::primitives::Blob;
use lambda::types::{Environment, FunctionCode, LastUpdateStatus, Runtime, State};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: u32 = 90;
/// New IAM roles take a few seconds before Lambda may assume them.
const ROLE_PROPAGATION_RETRIES: u32 = 8;
const ROLE_PROPAGATION_DELAY: Duration = Duration::from_secs(5);
const SCHEDULE_TARGET_ID: &str = "lambda-target";

pub struct AwsProvisioner {
    iam: iam::Client,
    lambda: lambda::Client,
    events: events::Client,
    budgets: budgets::Client,
    sns: sns::Client,
    sts: sts::Client,
}

impl AwsProvisioner {
    pub async fn from_config(config: &DeployConfig) -> Self {
        let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()))
            .or_default_provider()
            .or_else("ap-southeast-1");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        Self {
            iam: iam::Client::new(&shared),
            lambda: lambda::Client::new(&shared),
            events: events::Client::new(&shared),
            budgets: budgets::Client::new(&shared),
            sns: sns::Client::new(&shared),
            sts: sts::Client::new(&shared),
        }
    }

    async fn account_id(&self) -> Result<String, DeployError> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| DeployError::aws("sts:GetCallerIdentity", e))?;
        identity
            .account()
            .map(str::to_string)
            .ok_or_else(|| missing("sts:GetCallerIdentity", "account"))
    }

    /// Blocks until the function has left `Pending` and any update has
    /// settled; Lambda rejects changes while one is in progress.
    async fn wait_until_ready(&self, function_name: &str) -> Result<(), DeployError> {
        for _ in 0..MAX_POLLS {
            let conf = self
                .lambda
                .get_function_configuration()
                .function_name(function_name)
                .send()
                .await
                .map_err(|e| DeployError::aws("lambda:GetFunctionConfiguration", e))?;

            if conf.last_update_status() == Some(&LastUpdateStatus::Failed) || conf.state() == Some(&State::Failed) {
                return Err(DeployError::Aws {
                    operation: "lambda:UpdateFunction",
                    message: conf
                        .last_update_status_reason()
                        .or(conf.state_reason())
                        .unwrap_or("function entered a failed state")
                        .to_string(),
                });
            }
            let busy = conf.state() == Some(&State::Pending)
                || conf.last_update_status() == Some(&LastUpdateStatus::InProgress);
            if !busy {
                return Ok(());
            }
            debug!("Waiting for {} to become ready", function_name);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(DeployError::Aws {
            operation: "lambda:GetFunctionConfiguration",
            message: format!("{} did not become ready in time", function_name),
        })
    }

    async fn create_function(
        &self,
        config: &DeployConfig,
        code: Vec<u8>,
        role_arn: &str,
        environment: Environment,
    ) -> Result<String, DeployError> {
        let mut attempt = 0;
        loop {
            let result = self
                .lambda
                .create_function()
                .function_name(&config.function_name)
                .description(format!("{} scheduled function", config.function_name))
                .runtime(Runtime::from(config.runtime.as_str()))
                .handler(&config.handler)
                .role(role_arn)
                .code(FunctionCode::builder().zip_file(Blob::new(code.clone())).build())
                .timeout(config.timeout)
                .memory_size(config.memory_size)
                .architectures(lambda_architecture(config.architecture()))
                .environment(environment.clone())
                .send()
                .await;
            match result {
                Ok(out) => {
                    return out
                        .function_arn()
                        .map(str::to_string)
                        .ok_or_else(|| missing("lambda:CreateFunction", "function_arn"))
                }
                Err(e)
                    if attempt < ROLE_PROPAGATION_RETRIES
                        && e.as_service_error()
                            .is_some_and(|se| se.is_invalid_parameter_value_exception()) =>
                {
                    attempt += 1;
                    info!("Role not assumable yet, retrying ({}/{})", attempt, ROLE_PROPAGATION_RETRIES);
                    tokio::time::sleep(ROLE_PROPAGATION_DELAY).await;
                }
                Err(e) => return Err(DeployError::aws("lambda:CreateFunction", e)),
            }
        }
    }

    async fn update_function(
        &self,
        config: &DeployConfig,
        code: Vec<u8>,
        role_arn: &str,
        environment: Environment,
    ) -> Result<String, DeployError> {
        self.wait_until_ready(&config.function_name).await?;
        self.lambda
            .update_function_code()
            .function_name(&config.function_name)
            .zip_file(Blob::new(code))
            .architectures(lambda_architecture(config.architecture()))
            .send()
            .await
            .map_err(|e| DeployError::aws("lambda:UpdateFunctionCode", e))?;
        info!("Function code updated");

        self.wait_until_ready(&config.function_name).await?;
        let out = self
            .lambda
            .update_function_configuration()
            .function_name(&config.function_name)
            .runtime(Runtime::from(config.runtime.as_str()))
            .handler(&config.handler)
            .role(role_arn)
            .timeout(config.timeout)
            .memory_size(config.memory_size)
            .environment(environment)
            .send()
            .await
            .map_err(|e| DeployError::aws("lambda:UpdateFunctionConfiguration", e))?;
        info!("Function configuration updated");

        out.function_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("lambda:UpdateFunctionConfiguration", "function_arn"))
    }

    async fn ensure_subscription(&self, topic_arn: &str, email: &str) -> Result<(), DeployError> {
        let existing = self
            .sns
            .list_subscriptions_by_topic()
            .topic_arn(topic_arn)
            .send()
            .await
            .map_err(|e| DeployError::aws("sns:ListSubscriptionsByTopic", e))?;
        let subscribed = existing
            .subscriptions()
            .iter()
            .any(|s| s.protocol() == Some("email") && s.endpoint() == Some(email));
        if subscribed {
            info!("{} is already subscribed to budget alerts", email);
            return Ok(());
        }
        self.sns
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("email")
            .endpoint(email)
            .send()
            .await
            .map_err(|e| DeployError::aws("sns:Subscribe", e))?;
        info!("Subscribed {}; the subscription must be confirmed from the email", email);
        Ok(())
    }
}

fn missing(operation: &'static str, field: &str) -> DeployError {
    DeployError::Aws {
        operation,
        message: format!("response has no {}", field),
    }
}

fn lambda_architecture(arch: Architecture) -> lambda::types::Architecture {
    match arch {
        Architecture::X86_64 => lambda::types::Architecture::X8664,
        Architecture::Arm64 => lambda::types::Architecture::Arm64,
    }
}

/// Alerts at 80% of actual spend and 100% of forecasted spend.
const BUDGET_ALERTS: [(NotificationType, f64); 2] = [(NotificationType::Actual, 80.0), (NotificationType::Forecasted, 100.0)];

fn budgets_build_error(e: budgets::error::BuildError) -> DeployError {
    DeployError::aws("budgets:CreateBudget", e)
}

fn budget_notification(notification_type: NotificationType, threshold: f64) -> Result<Notification, DeployError> {
    Notification::builder()
        .notification_type(notification_type)
        .comparison_operator(ComparisonOperator::GreaterThan)
        .threshold(threshold)
        .threshold_type(ThresholdType::Percentage)
        .build()
        .map_err(budgets_build_error)
}

fn topic_subscriber(topic_arn: &str) -> Result<Subscriber, DeployError> {
    Subscriber::builder()
        .subscription_type(SubscriptionType::Sns)
        .address(topic_arn)
        .build()
        .map_err(budgets_build_error)
}

/// SNS subscribers of an existing notification that point at another topic.
fn stale_subscribers<'a>(subscribers: &'a [Subscriber], topic_arn: &str) -> Vec<&'a Subscriber> {
    subscribers
        .iter()
        .filter(|s| s.subscription_type() == &SubscriptionType::Sns && s.address() != topic_arn)
        .collect()
}

impl AwsProvisioner {
    /// Points the alerts of an existing budget at `topic_arn`, creating any
    /// alert the budget lacks.
    async fn reconcile_budget_alerts(
        &self,
        account_id: &str,
        budget_name: &str,
        topic_arn: &str,
    ) -> Result<(), DeployError> {
        let subscriber = topic_subscriber(topic_arn)?;
        for (notification_type, threshold) in BUDGET_ALERTS {
            let notification = budget_notification(notification_type, threshold)?;
            let created = self
                .budgets
                .create_notification()
                .account_id(account_id)
                .budget_name(budget_name)
                .notification(notification.clone())
                .subscribers(subscriber.clone())
                .send()
                .await;
            match created {
                Ok(_) => {
                    info!("Added {}% alert to '{}'", threshold, budget_name);
                    continue;
                }
                Err(e) if e.as_service_error().is_some_and(|se| se.is_duplicate_record_exception()) => {}
                Err(e) => return Err(DeployError::aws("budgets:CreateNotification", e)),
            }

            let existing = self
                .budgets
                .describe_subscribers_for_notification()
                .account_id(account_id)
                .budget_name(budget_name)
                .notification(notification.clone())
                .send()
                .await
                .map_err(|e| DeployError::aws("budgets:DescribeSubscribersForNotification", e))?;
            for old in stale_subscribers(existing.subscribers(), topic_arn) {
                self.budgets
                    .update_subscriber()
                    .account_id(account_id)
                    .budget_name(budget_name)
                    .notification(notification.clone())
                    .old_subscriber(old.clone())
                    .new_subscriber(subscriber.clone())
                    .send()
                    .await
                    .map_err(|e| DeployError::aws("budgets:UpdateSubscriber", e))?;
                info!("Moved {}% alert from {} to {}", threshold, old.address(), topic_arn);
            }
        }
        Ok(())
    }
}

impl Provisioner for AwsProvisioner {
    async fn ensure_role(&self, config: &DeployConfig) -> Result<String, DeployError> {
        let existing = match self.iam.get_role().role_name(&config.role_name).send().await {
            Ok(out) => out.role().map(|r| r.arn().to_string()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_entity_exception()) => None,
            Err(e) => return Err(DeployError::aws("iam:GetRole", e)),
        };

        let role_arn = match existing {
            Some(arn) => {
                info!("Using existing role {}", config.role_name);
                arn
            }
            None => {
                info!("Creating role {}", config.role_name);
                let out = self
                    .iam
                    .create_role()
                    .role_name(&config.role_name)
                    .assume_role_policy_document(lambda_trust_policy().to_json()?)
                    .description(format!("Execution role for {}", config.function_name))
                    .send()
                    .await
                    .map_err(|e| DeployError::aws("iam:CreateRole", e))?;
                out.role()
                    .map(|r| r.arn().to_string())
                    .ok_or_else(|| missing("iam:CreateRole", "role"))?
            }
        };

        // Attaching an already attached managed policy is a no-op.
        self.iam
            .attach_role_policy()
            .role_name(&config.role_name)
            .policy_arn(LAMBDA_BASIC_EXECUTION_POLICY)
            .send()
            .await
            .map_err(|e| DeployError::aws("iam:AttachRolePolicy", e))?;
        Ok(role_arn)
    }

    async fn deploy_function(
        &self,
        config: &DeployConfig,
        package: &Path,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<String, DeployError> {
        let code = std::fs::read(package)?;
        info!("Uploading {} ({} KB)", package.display(), code.len() / 1024);
        let variables: HashMap<String, String> = environment.clone().into_iter().collect();
        let environment = Environment::builder().set_variables(Some(variables)).build();

        let exists = match self.lambda.get_function().function_name(&config.function_name).send().await {
            Ok(_) => true,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) => false,
            Err(e) => return Err(DeployError::aws("lambda:GetFunction", e)),
        };

        let arn = if exists {
            info!("Updating function {}", config.function_name);
            self.update_function(config, code, role_arn, environment).await?
        } else {
            info!("Creating function {}", config.function_name);
            self.create_function(config, code, role_arn, environment).await?
        };
        self.wait_until_ready(&config.function_name).await?;
        Ok(arn)
    }

    async fn ensure_schedule(&self, config: &DeployConfig, function_arn: &str) -> Result<String, DeployError> {
        let rule = self
            .events
            .put_rule()
            .name(&config.schedule_name)
            .schedule_expression(&config.schedule_expression)
            .state(RuleState::Enabled)
            .description(format!("Runs {} on {}", config.function_name, config.schedule_expression))
            .send()
            .await
            .map_err(|e| DeployError::aws("events:PutRule", e))?;
        let rule_arn = rule
            .rule_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("events:PutRule", "rule_arn"))?;

        let permission = self
            .lambda
            .add_permission()
            .function_name(&config.function_name)
            .statement_id(format!("{}-invoke", config.schedule_name))
            .action("lambda:InvokeFunction")
            .principal("events.amazonaws.com")
            .source_arn(&rule_arn)
            .send()
            .await;
        match permission {
            Ok(_) => info!("Granted EventBridge permission to invoke {}", config.function_name),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_conflict_exception()) => {
                debug!("Invoke permission already present")
            }
            Err(e) => return Err(DeployError::aws("lambda:AddPermission", e)),
        }

        let target = Target::builder()
            .id(SCHEDULE_TARGET_ID)
            .arn(function_arn)
            .build()
            .map_err(|e| DeployError::aws("events:PutTargets", e))?;
        let out = self
            .events
            .put_targets()
            .rule(&config.schedule_name)
            .targets(target)
            .send()
            .await
            .map_err(|e| DeployError::aws("events:PutTargets", e))?;
        if let Some(failed) = out.failed_entries().first() {
            return Err(DeployError::Aws {
                operation: "events:PutTargets",
                message: failed.error_message().unwrap_or("target rejected").to_string(),
            });
        }
        Ok(rule_arn)
    }

    async fn ensure_budget_alerts(&self, config: &DeployConfig) -> Result<(), DeployError> {
        let email = config.budget_email.as_deref().ok_or(DeployError::MissingBudgetEmail)?;

        let topic = self
            .sns
            .create_topic()
            .name(config.budget_topic_name())
            .send()
            .await
            .map_err(|e| DeployError::aws("sns:CreateTopic", e))?;
        let topic_arn = topic
            .topic_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("sns:CreateTopic", "topic_arn"))?;
        self.sns
            .set_topic_attributes()
            .topic_arn(&topic_arn)
            .attribute_name("Policy")
            .attribute_value(budget_topic_policy(&topic_arn).to_json()?)
            .send()
            .await
            .map_err(|e| DeployError::aws("sns:SetTopicAttributes", e))?;
        self.ensure_subscription(&topic_arn, email).await?;

        let account_id = self.account_id().await?;
        let limit = Spend::builder()
            .amount(format!("{:.2}", config.budget_limit))
            .unit("USD")
            .build()
            .map_err(|e| DeployError::aws("budgets:CreateBudget", e))?;
        let budget = Budget::builder()
            .budget_name(&config.budget_name)
            .budget_limit(limit)
            .time_unit(TimeUnit::Monthly)
            .budget_type(BudgetType::Cost)
            .build()
            .map_err(|e| DeployError::aws("budgets:CreateBudget", e))?;

        let subscriber = topic_subscriber(&topic_arn)?;
        let notifications = BUDGET_ALERTS
            .into_iter()
            .map(|(notification_type, threshold)| {
                NotificationWithSubscribers::builder()
                    .notification(budget_notification(notification_type, threshold)?)
                    .subscribers(subscriber.clone())
                    .build()
                    .map_err(budgets_build_error)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let created = self
            .budgets
            .create_budget()
            .account_id(&account_id)
            .budget(budget.clone())
            .set_notifications_with_subscribers(Some(notifications))
            .send()
            .await;
        match created {
            Ok(_) => info!("Created budget '{}'", config.budget_name),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_duplicate_record_exception()) => {
                warn!("Budget '{}' exists, updating its limit and alerts", config.budget_name);
                self.budgets
                    .update_budget()
                    .account_id(&account_id)
                    .new_budget(budget)
                    .send()
                    .await
                    .map_err(|e| DeployError::aws("budgets:UpdateBudget", e))?;
                self.reconcile_budget_alerts(&account_id, &config.budget_name, &topic_arn)
                    .await?;
            }
            Err(e) => return Err(DeployError::aws("budgets:CreateBudget", e)),
        }
        Ok(())
    }
}
