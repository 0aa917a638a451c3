use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{Context, LambdaEvent};
use myapp::handler::handle_with_env;
use myapp::EnvSnapshot;
use serde_json::{json, Value};

fn scheduled_event() -> LambdaEvent<CloudWatchEvent> {
    let payload: CloudWatchEvent = serde_json::from_value(json!({
        "version": "0",
        "id": "53dc4d37-cffa-4f76-80c9-8b7d4a4d2eaa",
        "detail-type": "Scheduled Event",
        "source": "aws.events",
        "account": "123456789012",
        "time": "2026-10-16T12:00:00Z",
        "region": "ap-southeast-1",
        "resources": ["arn:aws:events:ap-southeast-1:123456789012:rule/myapp-schedule"],
        "detail": {}
    }))
    .unwrap();
    LambdaEvent::new(payload, Context::default())
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

#[test]
fn test_scheduled_run_succeeds() {
    let env = EnvSnapshot::from_pairs([("MYAPP_REQUIRED_VAR", "value"), ("MYAPP_FEATURE_EXAMPLE", "true")]);
    let res = block_on(handle_with_env(scheduled_event(), env)).unwrap();
    assert_eq!(res.status_code, 200);
    let body: Value = serde_json::from_str(&res.body).unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "MyApp completed successfully");
}

#[test]
fn test_missing_required_var_reports_error() {
    let res = block_on(handle_with_env(scheduled_event(), EnvSnapshot::default())).unwrap();
    assert_eq!(res.status_code, 500);
    let body: Value = serde_json::from_str(&res.body).unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("MYAPP_REQUIRED_VAR"));
}

#[test]
fn test_response_uses_status_code_key() {
    let env = EnvSnapshot::from_pairs([("MYAPP_REQUIRED_VAR", "value")]);
    let res = block_on(handle_with_env(scheduled_event(), env)).unwrap();
    let encoded = serde_json::to_value(&res).unwrap();
    assert_eq!(encoded["statusCode"], 200);
    assert!(encoded["body"].is_string());
}
