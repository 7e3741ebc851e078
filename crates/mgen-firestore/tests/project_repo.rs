//! Project repository against a mock Firestore endpoint.

use chrono::{TimeZone, Utc};
use mgen_firestore::{FirestoreClient, FirestoreConfig, FirestoreError, ProjectRepository, RetryConfig};
use mgen_models::ProjectId;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOC_PATH: &str = "/v1/projects/demo/databases/(default)/documents/projects/proj-1";

fn repo(server: &MockServer, retry: RetryConfig) -> ProjectRepository {
    let config = FirestoreConfig {
        emulator_host: Some(server.address().to_string()),
        retry,
        ..FirestoreConfig::new("demo")
    };
    ProjectRepository::new(FirestoreClient::new(config).unwrap())
}

#[tokio::test]
async fn update_final_video_url_sends_masked_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .and(header("authorization", "Bearer owner"))
        .and(query_param("updateMask.fieldPaths", "final_video_url"))
        .and(query_param("updateMask.fieldPaths", "updated_at"))
        .and(query_param("currentDocument.exists", "true"))
        .and(body_partial_json(json!({
            "fields": {
                "final_video_url": {"stringValue": "https://cdn.example.com/proj-1/videos/demo.mp4"},
                "updated_at": {"timestampValue": "2025-03-01T12:00:00+00:00"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/projects/proj-1",
            "fields": {
                "final_video_url": {"stringValue": "https://cdn.example.com/proj-1/videos/demo.mp4"}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    repo(&server, RetryConfig::none())
        .update_final_video_url(
            &ProjectId::new("proj-1"),
            "https://cdn.example.com/proj-1/videos/demo.mp4",
            at,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn update_missing_project_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "status": "NOT_FOUND"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = repo(&server, RetryConfig::none())
        .update_final_video_url(&ProjectId::new("proj-1"), "https://cdn/x.mp4", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, FirestoreError::NotFound(_)));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let retry = RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    let err = repo(&server, retry)
        .update_final_video_url(&ProjectId::new("proj-1"), "https://cdn/x.mp4", Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn get_final_video_url_reads_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DOC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/projects/proj-1",
            "fields": {"final_video_url": {"stringValue": "https://cdn/x.mp4"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/demo/databases/(default)/documents/projects/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let repo = repo(&server, RetryConfig::none());
    assert_eq!(
        repo.get_final_video_url(&ProjectId::new("proj-1")).await.unwrap(),
        Some("https://cdn/x.mp4".to_string())
    );
    assert_eq!(repo.get_final_video_url(&ProjectId::new("missing")).await.unwrap(), None);
}
