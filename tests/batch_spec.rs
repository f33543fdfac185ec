//! Batch orchestration tests against a mock sync endpoint.

use std::time::Duration;

use serde_json::{json, Value};
use todoist_mcp::batch::*;
use todoist_mcp::config::{ApiConfig, RateLimitConfig, RetryConfig};
use todoist_mcp::error::ErrorKind;
use todoist_mcp::sync::*;
use todoist_mcp::TodoistClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn fast_limit(capacity: u32) -> RateLimitConfig {
    RateLimitConfig {
        capacity,
        window: Duration::from_secs(60),
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
    }
}

/// Helper to create a mock API and a batch service pointed at it.
async fn setup() -> (MockServer, BatchService) {
    let server = MockServer::start().await;
    let config = ApiConfig::new(server.uri(), Some("test-token".to_string()))
        .with_retry(RetryConfig {
            attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            default_rate_limit_wait: Duration::from_millis(10),
        })
        .with_rate_limits(fast_limit(300), fast_limit(50));
    let client = TodoistClient::new(config).expect("Failed to build client");
    (server, BatchService::new(client))
}

/// Answers "ok" for every command except the listed positions, and maps
/// each declared temp id to a fresh real id.
struct StatusByPosition {
    failing: Vec<usize>,
}

impl Respond for StatusByPosition {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("sync body is JSON");
        let mut status = serde_json::Map::new();
        let mut mapping = serde_json::Map::new();

        for (i, command) in body["commands"].as_array().expect("commands").iter().enumerate() {
            let uuid = command["uuid"].as_str().unwrap().to_string();
            if self.failing.contains(&i) {
                status.insert(
                    uuid,
                    json!({"error": format!("Command {} rejected", i), "error_code": 20, "http_code": 400}),
                );
            } else {
                status.insert(uuid, json!("ok"));
                if let Some(temp_id) = command["temp_id"].as_str() {
                    mapping.insert(temp_id.to_string(), json!(format!("69{:08}", i)));
                }
            }
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "sync_status": status,
            "temp_id_mapping": mapping,
            "full_sync": false
        }))
    }
}

fn pending(value: Value) -> PendingCommand {
    serde_json::from_value(value).expect("valid command")
}

fn completes(n: usize) -> Vec<PendingCommand> {
    (0..n)
        .map(|i| pending(json!({"type": "item_complete", "args": {"id": i.to_string()}})))
        .collect()
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn empty_and_oversized_batches_never_reach_the_network() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![] })
            .expect(0)
            .mount(&server)
            .await;

        let err = service.execute(BatchRequest::new(vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .execute(BatchRequest::new(completes(MAX_BATCH_COMMANDS + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("100"));
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let (_server, service) = setup().await;
        let mut request = BatchRequest::new(vec![
            pending(json!({"type": "project_add", "temp_id": "proj", "args": {"name": "Move"}})),
            pending(json!({"type": "item_add", "args": {"content": "Pack", "project_id": "proj"}})),
        ]);
        request.dependencies = vec![CommandDependency {
            command_index: 1,
            depends_on: "missing".into(),
        }];

        let err = service.execute(request).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn validate_only_reports_full_success_without_sending() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![] })
            .expect(0)
            .mount(&server)
            .await;

        let mut request = BatchRequest::new(completes(4));
        request.options.validate_only = true;

        let result = service.execute(request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.completed_commands, 4);
        assert_eq!(result.failed_commands, 0);
        assert!(result.temp_id_mapping.is_empty());
    }
}

mod execution {
    use super::*;

    #[tokio::test]
    async fn resolves_temp_ids_for_dependent_commands() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![] })
            .expect(1)
            .mount(&server)
            .await;

        let mut request = BatchRequest::new(vec![
            pending(json!({"type": "project_add", "temp_id": "proj", "args": {"name": "Move"}})),
            pending(json!({
                "type": "item_add",
                "temp_id": "task",
                "args": {"content": "Pack", "project_id": "proj"}
            })),
        ]);
        request.dependencies = vec![CommandDependency {
            command_index: 1,
            depends_on: "proj".into(),
        }];

        let result = service.execute(request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.completed_commands, 2);
        assert_eq!(result.temp_id_mapping.len(), 2);
        assert!(result.temp_id_mapping.contains_key("proj"));
    }

    #[tokio::test]
    async fn assigns_uuids_to_commands_without_one() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![] })
            .mount(&server)
            .await;

        service.execute(BatchRequest::new(completes(3))).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        let uuids: Vec<&str> = body["commands"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["uuid"].as_str().unwrap())
            .collect();
        assert_eq!(uuids.len(), 3);
        assert!(uuids.iter().all(|u| !u.is_empty()));
        assert_ne!(uuids[0], uuids[1]);
    }

    #[tokio::test]
    async fn continue_on_error_counts_every_command() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![1, 3] })
            .mount(&server)
            .await;

        let mut request = BatchRequest::new(completes(5));
        request.options.continue_on_error = true;

        let result = service.execute(request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.completed_commands, 3);
        assert_eq!(result.failed_commands, 2);
        assert_eq!(result.completed_commands + result.failed_commands, 5);

        let indices: Vec<i64> = result.errors.iter().map(|e| e.command_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(result.errors[0].command_type.as_deref(), Some("item_complete"));
        assert_eq!(result.errors[0].error_code, Some(20));
    }

    #[tokio::test]
    async fn stops_at_first_failure_by_default() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(StatusByPosition { failing: vec![1, 3] })
            .mount(&server)
            .await;

        let result = service.execute(BatchRequest::new(completes(5))).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.completed_commands, 1);
        assert_eq!(result.failed_commands, 1);
        assert_eq!(result.skipped_commands, 3);
        assert_eq!(result.total_commands(), 5);
    }

    #[tokio::test]
    async fn call_level_failure_marks_every_command_failed() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let result = service.execute(BatchRequest::new(completes(4))).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.completed_commands, 0);
        assert_eq!(result.failed_commands, 4);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].command_index, -1);
        assert_eq!(result.errors[0].error, "Todoist is temporarily unavailable");
    }

    #[tokio::test]
    async fn authentication_failure_is_an_error() {
        let (server, service) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = service.execute(BatchRequest::new(completes(2))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
