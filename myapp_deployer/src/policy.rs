use serde::{Deserialize, Serialize};

pub static POLICY_VERSION: &str = "2012-10-17";
pub static LAMBDA_BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "Service")]
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Default)]
pub struct PolicyBuilder {
    statements: Vec<PolicyStatement>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `service` (e.g. `lambda.amazonaws.com`) assume the role.
    pub fn allow_assume_role(self, service: &str) -> Self {
        self.add_statement(PolicyStatement {
            sid: None,
            effect: Effect::Allow,
            principal: Some(Principal {
                service: service.to_string(),
            }),
            action: vec!["sts:AssumeRole".to_string()],
            resource: vec![],
        })
    }

    pub fn allow_service_action(self, sid: &str, service: &str, action: &str, resource: &str) -> Self {
        self.add_statement(PolicyStatement {
            sid: Some(sid.to_string()),
            effect: Effect::Allow,
            principal: Some(Principal {
                service: service.to_string(),
            }),
            action: vec![action.to_string()],
            resource: vec![resource.to_string()],
        })
    }

    pub fn add_statement(mut self, stmt: PolicyStatement) -> Self {
        self.statements.push(stmt);
        self
    }

    pub fn build(self) -> PolicyDocument {
        PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement: self.statements,
        }
    }
}

impl PolicyDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn lambda_trust_policy() -> PolicyDocument {
    PolicyBuilder::new().allow_assume_role("lambda.amazonaws.com").build()
}

pub fn budget_topic_policy(topic_arn: &str) -> PolicyDocument {
    PolicyBuilder::new()
        .allow_service_action("AllowBudgetsPublish", "budgets.amazonaws.com", "SNS:Publish", topic_arn)
        .build()
}

#[test]
fn test_trust_policy_json() {
    let value: serde_json::Value = serde_json::from_str(&lambda_trust_policy().to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Service": "lambda.amazonaws.com"},
                "Action": ["sts:AssumeRole"]
            }]
        })
    );
}

#[test]
fn test_budget_topic_policy() {
    let policy = budget_topic_policy("arn:aws:sns:ap-southeast-1:123456789012:myapp-budget-alerts");
    let stmt = &policy.statement[0];
    assert_eq!(stmt.sid.as_deref(), Some("AllowBudgetsPublish"));
    assert_eq!(stmt.principal.as_ref().unwrap().service, "budgets.amazonaws.com");
    assert_eq!(stmt.resource, vec!["arn:aws:sns:ap-southeast-1:123456789012:myapp-budget-alerts"]);
}
