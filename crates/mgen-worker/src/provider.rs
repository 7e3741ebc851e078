//! Generation provider client.
//!
//! Every generator has two variants: *create* produces an artifact from a
//! prompt alone, *transform* starts from an existing asset. Workers pick the
//! variant solely on whether the job carries a seed URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// What a provider is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Image,
    Video,
    Plan,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Image => "image",
            GenerationKind::Video => "video",
            GenerationKind::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub prompt: String,
    /// Resolved generation options, passed through as-is
    pub options: Value,
}

/// Provider result: a hosted artifact, a document, or both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratedArtifact {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub document: Option<Value>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate from the prompt alone.
    async fn create(&self, request: &GenerationRequest) -> WorkerResult<GeneratedArtifact>;

    /// Generate starting from the asset at `source_url`.
    async fn transform(
        &self,
        request: &GenerationRequest,
        source_url: &str,
    ) -> WorkerResult<GeneratedArtifact>;
}

/// Provider endpoint configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_env() -> WorkerResult<Self> {
        let base_url = std::env::var("GENERATION_API_URL")
            .map_err(|_| WorkerError::config("GENERATION_API_URL not set"))?;
        let timeout_secs: u64 = std::env::var("GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            api_key: std::env::var("GENERATION_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
            ..Self::new(base_url)
        })
    }
}

#[derive(Serialize)]
struct TransformBody<'a> {
    #[serde(flatten)]
    request: &'a GenerationRequest,
    source_url: &'a str,
}

/// [`GenerationProvider`] over a JSON HTTP API.
///
/// `POST {base}/v1/{kind}/generate` and `POST {base}/v1/{kind}/transform`,
/// both answering `{"url": ..., "document": ...}`.
#[derive(Clone)]
pub struct HttpGenerationProvider {
    http: Client,
    config: ProviderConfig,
}

impl HttpGenerationProvider {
    pub fn new(config: ProviderConfig) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("mgen-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    fn endpoint(&self, kind: GenerationKind, action: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            kind.as_str(),
            action
        )
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> WorkerResult<GeneratedArtifact> {
        debug!(url = %url, "Calling generation provider");

        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(WorkerError::provider(
                format!("Provider returned {}: {}", status, body),
                retryable,
            ));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn create(&self, request: &GenerationRequest) -> WorkerResult<GeneratedArtifact> {
        self.post(&self.endpoint(request.kind, "generate"), request)
            .await
    }

    async fn transform(
        &self,
        request: &GenerationRequest,
        source_url: &str,
    ) -> WorkerResult<GeneratedArtifact> {
        let body = TransformBody {
            request,
            source_url,
        };
        self.post(&self.endpoint(request.kind, "transform"), &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            kind: GenerationKind::Video,
            prompt: "waves at night".to_string(),
            options: serde_json::json!({"duration_seconds": 8}),
        }
    }

    async fn provider(server: &MockServer) -> HttpGenerationProvider {
        HttpGenerationProvider::new(ProviderConfig {
            api_key: Some("secret".to_string()),
            ..ProviderConfig::new(server.uri())
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_posts_prompt_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/video/generate"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "kind": "video",
                "prompt": "waves at night"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://cdn/v.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let artifact = provider(&server).await.create(&request()).await.unwrap();
        assert_eq!(artifact.url.as_deref(), Some("https://cdn/v.mp4"));
    }

    #[tokio::test]
    async fn test_transform_sends_source_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/video/transform"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "waves at night",
                "source_url": "https://cdn/seed.png"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://cdn/v2.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let artifact = provider(&server)
            .await
            .transform(&request(), "https://cdn/seed.png")
            .await
            .unwrap();
        assert_eq!(artifact.url.as_deref(), Some("https://cdn/v2.mp4"));
    }

    #[tokio::test]
    async fn test_error_status_keeps_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/video/generate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("prompt rejected"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/image/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = provider(&server).await;
        let err = provider.create(&request()).await.unwrap_err();
        assert!(err.to_string().contains("prompt rejected"));
        assert!(!err.is_retryable());

        let image = GenerationRequest {
            kind: GenerationKind::Image,
            ..request()
        };
        let err = provider.create(&image).await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
        assert!(err.is_retryable());
    }
}
