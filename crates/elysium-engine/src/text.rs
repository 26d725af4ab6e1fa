use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::TextConfig;
use crate::error::{truncate_text, ProviderError};

/// Returned in place of a scene whenever the text model fails.
pub const COMPLETION_SENTINEL: &str = "Error: The AI storyteller is currently unavailable.";

const GEMINI: &str = "gemini";

#[async_trait]
pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Gemini `generateContent` over plain JSON.
pub struct GeminiTextModel {
    config: TextConfig,
    http: HttpClient,
}

impl GeminiTextModel {
    pub fn new(config: TextConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        })
    }

    /// Text of the first candidate, all of its text parts joined.
    fn extract_text(payload: &Value) -> Result<String, ProviderError> {
        let candidate = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or(ProviderError::EmptyResponse { provider: GEMINI })?;
        let text = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse { provider: GEMINI });
        }
        Ok(text)
    }
}

#[async_trait]
impl TextModel for GeminiTextModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let endpoint = self.endpoint();
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.config.timeout)
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: GEMINI,
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: GEMINI,
                source,
            })?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: GEMINI,
                code: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let payload: Value = serde_json::from_str(&body).map_err(|err| ProviderError::Decode {
            provider: GEMINI,
            detail: err.to_string(),
        })?;
        Self::extract_text(&payload)
    }
}

/// Never fails: any provider error is logged and replaced by
/// [`COMPLETION_SENTINEL`]. No retry.
#[derive(Clone)]
pub struct CompletionClient {
    model: Arc<dyn TextModel>,
}

impl CompletionClient {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn complete(&self, prompt: &str) -> String {
        match self.model.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!(model = self.model.name(), "text model returned blank output");
                COMPLETION_SENTINEL.to_string()
            }
            Err(err) => {
                tracing::warn!(model = self.model.name(), error = %err, "text API call failed");
                COMPLETION_SENTINEL.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Json, Query};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};

    use super::*;
    use crate::testing::{serve_stub, ScriptedText};

    fn config_for(base: &str) -> TextConfig {
        TextConfig {
            api_base: base.to_string(),
            model: "gemini-test".to_string(),
            api_key: Some("text-key".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_prefixes_models_path_once() {
        let mut config = config_for("https://example.test/v1beta");
        let model = GeminiTextModel::new(config.clone());
        assert_eq!(
            model.endpoint(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
        config.model = "models/gemini-test".to_string();
        assert_eq!(
            GeminiTextModel::new(config).endpoint(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn extract_text_joins_first_candidate_parts() {
        let payload = json!({
            "candidates": [
                {"content": {"parts": [{"text": "The gate "}, {"text": "creaks."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        });
        assert_eq!(
            GeminiTextModel::extract_text(&payload).ok().as_deref(),
            Some("The gate creaks.")
        );
    }

    #[test]
    fn extract_text_rejects_missing_or_blank_candidates() {
        assert!(GeminiTextModel::extract_text(&json!({})).is_err());
        assert!(GeminiTextModel::extract_text(&json!({"candidates": []})).is_err());
        assert!(GeminiTextModel::extract_text(
            &json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]})
        )
        .is_err());
    }

    #[tokio::test]
    async fn gemini_model_posts_prompt_envelope_with_key() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/v1beta/models/gemini-test:generateContent",
            post(
                |Query(query): Query<std::collections::HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    let prompt = body["contents"][0]["parts"][0]["text"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    let key = query.get("key").cloned().unwrap_or_default();
                    Json(json!({
                        "candidates": [
                            {"content": {"parts": [{"text": format!("{key}:{prompt}")}]}}
                        ]
                    }))
                },
            ),
        );
        let base = serve_stub(app).await?;
        let model = GeminiTextModel::new(config_for(&format!("{base}/v1beta")));

        let text = model.generate("Begin.").await?;
        assert_eq!(text, "text-key:Begin.");
        Ok(())
    }

    #[tokio::test]
    async fn gemini_model_maps_http_failures_to_status_errors() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/v1beta/models/gemini-test:generateContent",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve_stub(app).await?;
        let model = GeminiTextModel::new(config_for(&format!("{base}/v1beta")));

        match model.generate("Begin.").await {
            Err(ProviderError::Status { code, body, .. }) => {
                assert_eq!(code, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn gemini_model_maps_non_json_success_to_decode_error() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/v1beta/models/gemini-test:generateContent",
            post(|| async { (StatusCode::OK, "<html>maintenance</html>") }),
        );
        let base = serve_stub(app).await?;
        let config = config_for(&format!("{base}/v1beta"));

        let model = GeminiTextModel::new(config.clone());
        assert!(matches!(
            model.generate("Begin.").await,
            Err(ProviderError::Decode { .. })
        ));

        let client = CompletionClient::new(Arc::new(GeminiTextModel::new(config)));
        assert_eq!(client.complete("Begin.").await, COMPLETION_SENTINEL);
        Ok(())
    }

    #[tokio::test]
    async fn completion_client_returns_sentinel_when_unreachable() {
        let mut config = config_for("http://127.0.0.1:9/v1beta");
        config.timeout = Duration::from_secs(2);
        let client = CompletionClient::new(Arc::new(GeminiTextModel::new(config)));
        assert_eq!(client.complete("Begin.").await, COMPLETION_SENTINEL);
    }

    #[tokio::test]
    async fn completion_client_passes_text_or_sentinel() {
        let model = Arc::new(ScriptedText::new(vec![
            Ok("A torch flickers.".to_string()),
            Ok("   ".to_string()),
            Err(ProviderError::EmptyResponse { provider: "scripted" }),
        ]));
        let client = CompletionClient::new(model.clone());

        assert_eq!(client.complete("one").await, "A torch flickers.");
        assert_eq!(client.complete("two").await, COMPLETION_SENTINEL);
        assert_eq!(client.complete("three").await, COMPLETION_SENTINEL);
        assert_eq!(model.prompts(), vec!["one", "two", "three"]);
    }
}
