//! Sync protocol tests: submission, status mapping and the retry policy.

use std::time::Duration;

use serde_json::{json, Value};
use todoist_mcp::client::EndpointClass;
use todoist_mcp::config::{ApiConfig, RateLimitConfig, RetryConfig};
use todoist_mcp::error::{ErrorKind, TodoistError};
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

/// Helper to create a mock API and a client pointed at it.
async fn setup() -> (MockServer, TodoistClient) {
    let server = MockServer::start().await;
    let config = ApiConfig::new(server.uri(), Some("test-token".to_string()))
        .with_retry(RetryConfig {
            attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            default_rate_limit_wait: Duration::from_millis(10),
        })
        .with_rate_limits(fast_limit(300), fast_limit(50));
    let client = TodoistClient::new(config).expect("Failed to build client");
    (server, client)
}

/// Answers every submitted command with "ok".
struct AllOk;

impl Respond for AllOk {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("sync body is JSON");
        let mut status = serde_json::Map::new();
        let mut mapping = serde_json::Map::new();
        for (i, command) in body["commands"].as_array().expect("commands").iter().enumerate() {
            status.insert(command["uuid"].as_str().unwrap().to_string(), json!("ok"));
            if let Some(temp_id) = command["temp_id"].as_str() {
                mapping.insert(temp_id.to_string(), json!(format!("real-{}", i)));
            }
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "sync_status": status,
            "temp_id_mapping": mapping,
            "full_sync": false
        }))
    }
}

fn complete(id: &str) -> SyncCommand {
    SyncCommand::new(CommandArgs::ItemComplete(IdArgs { id: id.to_string() }))
}

mod submission {
    use super::*;

    #[tokio::test]
    async fn posts_commands_in_wire_shape() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(AllOk)
            .expect(1)
            .mount(&server)
            .await;

        let commands = vec![
            complete("1").with_uuid("u-1"),
            SyncCommand::new(CommandArgs::SectionAdd(SectionAddArgs {
                name: "Later".into(),
                project_id: "p1".into(),
            }))
            .with_temp_id("tmp-later"),
        ];
        let response = client.sync(&commands).await.unwrap();

        assert!(response.command_result("u-1").is_ok());
        assert_eq!(response.resolve_temp_id("tmp-later"), Some("real-1"));

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["commands"][0]["type"], "item_complete");
        assert_eq!(body["commands"][0]["args"], json!({"id": "1"}));
        assert_eq!(body["commands"][1]["temp_id"], "tmp-later");
    }

    #[tokio::test]
    async fn bills_the_sync_budget_only() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(AllOk)
            .mount(&server)
            .await;

        client.sync(&[complete("1")]).await.unwrap();

        assert_eq!(client.limiter(EndpointClass::Sync).status().remaining, 49);
        assert_eq!(client.limiter(EndpointClass::Rest).status().remaining, 300);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_locally() {
        let (_server, client) = setup().await;
        let err = client.sync(&[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn omitted_status_reads_as_failure() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sync_status": {},
                "temp_id_mapping": {}
            })))
            .mount(&server)
            .await;

        let command = complete("1");
        let response = client.sync(std::slice::from_ref(&command)).await.unwrap();
        let err = response.command_result(&command.uuid).unwrap_err();
        assert_eq!(err.error_tag.as_deref(), Some("INDETERMINATE"));
    }
}

mod retry_policy {
    use super::*;

    #[tokio::test]
    async fn service_unavailable_is_tried_exactly_attempts_times() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client.execute_batch(&[complete("1")]).await.unwrap_err();
        assert!(matches!(err, TodoistError::ServiceUnavailable { status: 503, .. }));
    }

    #[tokio::test]
    async fn timeouts_are_tried_exactly_attempts_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"sync_status": {}, "temp_id_mapping": {}}))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(3)
            .mount(&server)
            .await;

        let config = ApiConfig::new(server.uri(), Some("test-token".to_string()))
            .with_timeout(Duration::from_millis(100))
            .with_retry(RetryConfig {
                attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                default_rate_limit_wait: Duration::from_millis(10),
            })
            .with_rate_limits(fast_limit(300), fast_limit(50));
        let client = TodoistClient::new(config).unwrap();

        let err = client.execute_batch(&[complete("1")]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn rate_limit_waits_then_succeeds() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(AllOk)
            .expect(1)
            .mount(&server)
            .await;

        let command = complete("1");
        let response = client
            .execute_batch(std::slice::from_ref(&command))
            .await
            .unwrap();
        assert!(response.command_result(&command.uuid).is_ok());
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Bad commands"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.execute_batch(&[complete("1")]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn authentication_errors_are_not_retried() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.execute_batch(&[complete("1")]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn backoff_between_attempts_strictly_increases() {
        let policy = RetryConfig {
            attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            default_rate_limit_wait: Duration::from_secs(60),
        };
        let err = TodoistError::ServiceUnavailable {
            status: 503,
            message: "down".into(),
        };

        let delays: Vec<_> = (1..5).map(|n| retry_delay(&policy, &err, n)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }
}
