use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use nexus_core::errors::CompletionError;
use nexus_core::provider::{CompletionRequest, CompletionService};
use nexus_core::security::ApiKey;

use crate::converter::{self, GenerateContentResponse};
use crate::models::{self, ListModelsPage, ModelInfo};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini `generateContent` over plain HTTPS with an API key.
///
/// No request timeout is set: a slow generation only holds up the
/// connection that asked for it.
pub struct GeminiProvider {
    client: Client,
    api_key: ApiKey,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: ApiKey, base_url: impl Into<String>) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CompletionError::NetworkError(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, models::model_id(model))
    }

    /// Every model visible to the key that supports `generateContent`.
    #[instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, CompletionError> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(format!("{}/models", self.base_url))
                .header("x-goog-api-key", self.api_key.expose());
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let page: ListModelsPage = read_json(req.send().await).await?;
            found.extend(
                page.models
                    .into_iter()
                    .filter(ModelInfo::supports_generate_content),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = found.len(), "listed generation models");
        Ok(found)
    }
}

#[async_trait]
impl CompletionService for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(model = %request.model, turns = request.contents.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = converter::build_request_body(request);
        let resp = self
            .client
            .post(self.generate_url(&request.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await;

        let response: GenerateContentResponse = read_json(resp).await?;
        converter::extract_reply(&response)
    }
}

/// Map transport failures, non-2xx statuses and undecodable bodies onto
/// `CompletionError`.
async fn read_json<T: serde::de::DeserializeOwned>(
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, CompletionError> {
    let resp = resp.map_err(|e| CompletionError::NetworkError(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.unwrap_or_default();
        let message = converter::parse_api_error(&body);
        warn!(status = status.as_u16(), error = %message, "completion API returned an error");

        return Err(match CompletionError::from_status(status.as_u16(), message) {
            CompletionError::RateLimited { .. } => CompletionError::RateLimited { retry_after },
            other => other,
        });
    }

    let text = resp
        .text()
        .await
        .map_err(|e| CompletionError::NetworkError(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| CompletionError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ChatTurn;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(ApiKey::new("test-key"), server.uri()).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.0-flash".into(),
            contents: vec![ChatTurn::user("Hello")],
            system_instruction: "persona".into(),
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
                "systemInstruction": {"parts": [{"text": "persona"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hi there"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = provider(&server).complete(&request()).await.unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn quota_exhausted_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(serde_json::json!({
                        "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
                    })),
            )
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        match err {
            CompletionError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_key_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::AuthenticationFailed(ref m) if m == "API key not valid"));
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.error_kind(), "malformed_response");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let provider = GeminiProvider::new(ApiKey::new("k"), "http://127.0.0.1:1").unwrap();
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::NetworkError(_)));
    }

    #[tokio::test]
    async fn prefixed_model_name_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .mount(&server)
            .await;

        let mut req = request();
        req.model = "models/gemini-1.5-pro".into();
        assert_eq!(provider(&server).complete(&req).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn list_models_filters_and_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{
                    "name": "models/gemini-1.5-pro",
                    "displayName": "Gemini 1.5 Pro",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {
                        "name": "models/gemini-2.0-flash",
                        "displayName": "Gemini 2.0 Flash",
                        "supportedGenerationMethods": ["generateContent"]
                    },
                    {
                        "name": "models/text-embedding-004",
                        "displayName": "Text Embedding 004",
                        "supportedGenerationMethods": ["embedContent"]
                    }
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models().await.unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.id()).collect();
        assert_eq!(names, vec!["gemini-2.0-flash", "gemini-1.5-pro"]);
        assert_eq!(models[1].display_name, "Gemini 1.5 Pro");
    }
}
