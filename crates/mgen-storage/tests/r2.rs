//! R2 client against a mock S3 endpoint.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mgen_storage::{R2Client, R2Config};

fn client(server: &MockServer) -> R2Client {
    R2Client::new(R2Config {
        endpoint_url: server.uri(),
        access_key_id: "key".to_string(),
        secret_access_key: "secret".to_string(),
        bucket_name: "media".to_string(),
        region: "auto".to_string(),
        public_base_url: "https://cdn.example.com".to_string(),
    })
}

#[tokio::test]
async fn connectivity_check_succeeds_when_bucket_exists() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/media"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).check_connectivity().await.unwrap();
}

#[tokio::test]
async fn connectivity_check_fails_for_missing_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/media"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server).check_connectivity().await.unwrap_err();
    assert!(err.to_string().contains("R2 connectivity check failed"));
}
