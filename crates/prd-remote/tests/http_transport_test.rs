//! Integration tests for the reqwest transport behind the resilient client.
//!
//! A wiremock server stands in for the remote platform.

use prd_core::{LocalObject, ObjectType};
use prd_remote::{RemoteApi, RemoteClient, RemoteConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> RemoteConfig {
    RemoteConfig::new(format!("{}/api/v1", server.uri())).with_token("secret-token")
}

#[tokio::test]
async fn test_bearer_token_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/queues/5"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "url": "https://example.com/api/v1/queues/5",
            "name": "Invoices"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let queue = client.fetch_one(ObjectType::Queue, 5).await.unwrap();
    assert_eq!(queue.name.as_deref(), Some("Invoices"));
}

#[tokio::test]
async fn test_rate_limited_request_is_retried_with_retry_after() {
    let mock_server = MockServer::start().await;

    // Three 429s first; `Retry-After: 0` keeps the test fast.
    Mock::given(method("GET"))
        .and(path("/api/v1/hooks/7"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/hooks/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "url": "https://example.com/api/v1/hooks/7",
            "name": "Validate"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let hook = client.fetch_one(ObjectType::Hook, 7).await.unwrap();
    assert_eq!(hook.id, Some(7));
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/schemas/3"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let result = client.try_fetch(ObjectType::Schema, 3).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_list_sends_page_size_and_follows_next() {
    let mock_server = MockServer::start().await;
    let next = format!("{}/api/v1/labels?page=2", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/labels"))
        .and(query_param("page_size", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"next": next},
            "results": [{"id": 1, "url": "u1", "name": "urgent"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/labels"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"next": null},
            "results": [{"id": 2, "url": "u2", "name": "later"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let labels = client.fetch_all(ObjectType::Label).await.unwrap();
    let names: Vec<_> = labels.iter().map(|l| l.display_name().to_string()).collect();
    assert_eq!(names, vec!["urgent", "later"]);
}

#[tokio::test]
async fn test_update_sends_patch_with_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/rules/4"))
        .and(body_json(json!({"id": 4, "name": "Total check", "enabled": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4,
            "url": "https://example.com/api/v1/rules/4",
            "name": "Total check",
            "enabled": true,
            "modified_at": "2024-05-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let body =
        LocalObject::from_value(json!({"id": 4, "name": "Total check", "enabled": true})).unwrap();
    let updated = client.update(ObjectType::Rule, 4, &body).await.unwrap();
    assert_eq!(updated.modified_at.as_deref(), Some("2024-05-01T10:00:00Z"));
}

#[tokio::test]
async fn test_bad_request_surfaces_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/engines"))
        .respond_with(ResponseTemplate::new(400).set_body_string("name: required"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RemoteClient::from_config(&config(&mock_server)).expect("client");
    let err = client
        .create(ObjectType::Engine, &LocalObject::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("name: required"));
}
