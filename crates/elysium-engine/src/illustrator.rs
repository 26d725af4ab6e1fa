use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::{ImageConfig, LoadingRetryPolicy};
use crate::error::{truncate_text, ProviderError};
use crate::illustration::Illustration;

const HUGGINGFACE: &str = "huggingface";

#[async_trait]
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;
    /// Raw image bytes for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Hugging Face inference endpoint (Stable Diffusion XL by default).
pub struct HuggingFaceImageModel {
    config: ImageConfig,
    http: HttpClient,
}

impl HuggingFaceImageModel {
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    /// The model for `config`, or `None` when no API key is set.
    pub fn configured(config: &ImageConfig) -> Option<Arc<dyn ImageModel>> {
        config
            .api_key
            .as_ref()
            .map(|_| Arc::new(Self::new(config.clone())) as Arc<dyn ImageModel>)
    }

    /// Reads the `{"error": ..., "estimated_time": seconds}` warm-up envelope.
    fn loading_delay(body: &str) -> Option<Duration> {
        let payload: Value = serde_json::from_str(body).ok()?;
        payload.get("error")?;
        let seconds = payload.get("estimated_time").and_then(Value::as_f64)?;
        if seconds.is_nan() {
            return None;
        }
        // Estimates too large for a Duration saturate; the retry budget rejects them.
        Some(Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX))
    }
}

#[async_trait]
impl ImageModel for HuggingFaceImageModel {
    fn name(&self) -> &str {
        HUGGINGFACE
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ProviderError::MissingCredential("HUGGINGFACE_API_KEY"));
        };
        let transport = |source| ProviderError::Transport {
            provider: HUGGINGFACE,
            source,
        };
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .timeout(self.config.timeout)
            .json(&json!({ "inputs": prompt }))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        if status.is_success() {
            return Ok(body.to_vec());
        }

        let text = String::from_utf8_lossy(&body);
        if let Some(estimated) = Self::loading_delay(&text) {
            return Err(ProviderError::ModelLoading {
                provider: HUGGINGFACE,
                estimated,
            });
        }
        Err(ProviderError::Status {
            provider: HUGGINGFACE,
            code: status.as_u16(),
            body: truncate_text(&text, 512),
        })
    }
}

/// Turns a visual prompt into an [`Illustration`], or nothing.
///
/// Without an image model every call returns `None` immediately. A
/// "model is loading" response sleeps for the provider's estimate and tries
/// again, bounded by [`LoadingRetryPolicy`]. Every other failure yields
/// `None`.
#[derive(Clone)]
pub struct IllustrationClient {
    model: Option<Arc<dyn ImageModel>>,
    policy: LoadingRetryPolicy,
}

impl IllustrationClient {
    pub fn new(model: Option<Arc<dyn ImageModel>>, policy: LoadingRetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn from_config(config: &ImageConfig, policy: LoadingRetryPolicy) -> Self {
        Self::new(HuggingFaceImageModel::configured(config), policy)
    }

    pub fn enabled(&self) -> bool {
        self.model.is_some()
    }

    pub async fn illustrate(&self, visual_prompt: &str) -> Option<Illustration> {
        let Some(model) = self.model.as_ref() else {
            tracing::debug!("image generation disabled; skipping illustration");
            return None;
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut waited = Duration::ZERO;
        let mut attempt = 1;
        loop {
            match model.generate(visual_prompt).await {
                Ok(bytes) => {
                    return match Illustration::from_provider_bytes(&bytes) {
                        Ok(illustration) => Some(illustration),
                        Err(err) => {
                            tracing::warn!(
                                model = model.name(),
                                error = %format!("{err:#}"),
                                "discarding undecodable illustration"
                            );
                            None
                        }
                    };
                }
                Err(ProviderError::ModelLoading { estimated, .. }) => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            model = model.name(),
                            attempts = attempt,
                            "image model still loading; giving up"
                        );
                        return None;
                    }
                    let over_budget = waited
                        .checked_add(estimated)
                        .map_or(true, |total| total > self.policy.max_total_wait);
                    if over_budget {
                        tracing::warn!(
                            model = model.name(),
                            estimated_secs = estimated.as_secs_f64(),
                            waited_secs = waited.as_secs_f64(),
                            "image model warm-up exceeds wait budget; giving up"
                        );
                        return None;
                    }
                    tracing::info!(
                        model = model.name(),
                        estimated_secs = estimated.as_secs_f64(),
                        "image model is loading; waiting before retry"
                    );
                    tokio::time::sleep(estimated).await;
                    waited += estimated;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(model = model.name(), error = %err, "image generation failed");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::extract::{Json, State};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};

    use super::*;
    use crate::testing::{serve_stub, tiny_png, ScriptedImage};

    fn loading(secs: u64) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::ModelLoading {
            provider: "scripted",
            estimated: Duration::from_secs(secs),
        })
    }

    fn client_for(
        model: Arc<ScriptedImage>,
        max_attempts: u32,
        max_wait: u64,
    ) -> IllustrationClient {
        IllustrationClient::new(
            Some(model as Arc<dyn ImageModel>),
            LoadingRetryPolicy {
                max_attempts,
                max_total_wait: Duration::from_secs(max_wait),
            },
        )
    }

    #[test]
    fn loading_delay_requires_error_and_estimate() {
        assert_eq!(
            HuggingFaceImageModel::loading_delay(
                r#"{"error": "Model is currently loading", "estimated_time": 20.5}"#
            ),
            Some(Duration::from_millis(20_500))
        );
        assert_eq!(
            HuggingFaceImageModel::loading_delay(r#"{"estimated_time": 3}"#),
            None
        );
        assert_eq!(
            HuggingFaceImageModel::loading_delay(r#"{"error": "bad request"}"#),
            None
        );
        assert_eq!(HuggingFaceImageModel::loading_delay("<html>"), None);
    }

    #[test]
    fn oversized_loading_estimate_saturates() {
        assert_eq!(
            HuggingFaceImageModel::loading_delay(
                r#"{"error": "Model is currently loading", "estimated_time": 1e20}"#
            ),
            Some(Duration::MAX)
        );
        assert_eq!(
            HuggingFaceImageModel::loading_delay(r#"{"error": "loading", "estimated_time": -4}"#),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loading_response_waits_estimate_then_retries_once() {
        let model = Arc::new(ScriptedImage::new(vec![loading(20)]));
        let client = client_for(model.clone(), 2, 120);

        let started = tokio::time::Instant::now();
        let illustration = client.illustrate("castle at dusk").await;

        assert!(illustration.is_some());
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_loading_stops_at_attempt_limit() {
        let model = Arc::new(ScriptedImage::new(vec![loading(1), loading(1), loading(1)]));
        let client = client_for(model.clone(), 2, 120);

        assert!(client.illustrate("castle at dusk").await.is_none());
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_estimate_beyond_wait_budget_is_not_retried() {
        let model = Arc::new(ScriptedImage::new(vec![loading(600)]));
        let client = client_for(model.clone(), 3, 120);

        let started = tokio::time::Instant::now();
        assert!(client.illustrate("castle at dusk").await.is_none());
        assert!(started.elapsed() < Duration::from_secs(600));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_estimate_after_a_wait_gives_up_cleanly() {
        let model = Arc::new(ScriptedImage::new(vec![
            loading(10),
            Err(ProviderError::ModelLoading {
                provider: "scripted",
                estimated: Duration::MAX,
            }),
        ]));
        let client = client_for(model.clone(), 3, 120);

        assert!(client.illustrate("castle at dusk").await.is_none());
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn other_failures_return_nothing_without_retry() {
        let model = Arc::new(ScriptedImage::new(vec![Err(ProviderError::Status {
            provider: "scripted",
            code: 500,
            body: "boom".to_string(),
        })]));
        let client = client_for(model.clone(), 3, 120);

        assert!(client.illustrate("castle at dusk").await.is_none());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn undecodable_bytes_return_nothing() {
        let model = Arc::new(ScriptedImage::new(vec![Ok(b"not an image".to_vec())]));
        let client = client_for(model, 2, 120);
        assert!(client.illustrate("castle at dusk").await.is_none());
    }

    #[tokio::test]
    async fn missing_credential_never_touches_the_network() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/sd",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );
        let base = serve_stub(app).await.expect("stub server");
        let config = ImageConfig {
            endpoint: format!("{base}/sd"),
            api_key: None,
            timeout: Duration::from_secs(5),
        };

        let client = IllustrationClient::from_config(&config, LoadingRetryPolicy::default());
        assert!(!client.enabled());
        for prompt in ["castle", "", "dragon over the sea"] {
            assert!(client.illustrate(prompt).await.is_none());
        }

        let direct = HuggingFaceImageModel::new(config);
        assert!(matches!(
            direct.generate("castle").await,
            Err(ProviderError::MissingCredential(_))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    async fn warming_endpoint(
        State(hits): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some("Bearer hf-key");
        if !authorized || body["inputs"] != json!("castle at dusk") {
            return (StatusCode::BAD_REQUEST, "bad request").into_response();
        }
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "Model is currently loading", "estimated_time": 0.2})),
            )
                .into_response();
        }
        ([(header::CONTENT_TYPE, "image/png")], tiny_png()).into_response()
    }

    #[tokio::test]
    async fn huggingface_warmup_is_waited_out_over_http() -> anyhow::Result<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/sd", post(warming_endpoint))
            .with_state(hits.clone());
        let base = serve_stub(app).await?;
        let config = ImageConfig {
            endpoint: format!("{base}/sd"),
            api_key: Some("hf-key".to_string()),
            timeout: Duration::from_secs(5),
        };
        let client = IllustrationClient::from_config(&config, LoadingRetryPolicy::default());

        let started = Instant::now();
        let illustration = client.illustrate("castle at dusk").await;

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let illustration = illustration.expect("illustration after warm-up");
        assert_eq!((illustration.width(), illustration.height()), (4, 3));
        Ok(())
    }

    #[tokio::test]
    async fn huggingface_absurd_warmup_estimate_yields_nothing() -> anyhow::Result<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/sd",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": "Model is currently loading", "estimated_time": 1e20})),
                    )
                }
            }),
        );
        let base = serve_stub(app).await?;
        let config = ImageConfig {
            endpoint: format!("{base}/sd"),
            api_key: Some("hf-key".to_string()),
            timeout: Duration::from_secs(5),
        };
        let client = IllustrationClient::from_config(
            &config,
            LoadingRetryPolicy {
                max_attempts: 3,
                max_total_wait: Duration::from_secs(120),
            },
        );

        let joined = tokio::spawn(async move { client.illustrate("castle").await }).await;
        assert!(matches!(joined, Ok(None)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn huggingface_plain_errors_map_to_status() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/sd",
            post(|| async { (StatusCode::BAD_REQUEST, "invalid inputs") }),
        );
        let base = serve_stub(app).await?;
        let model = HuggingFaceImageModel::new(ImageConfig {
            endpoint: format!("{base}/sd"),
            api_key: Some("hf-key".to_string()),
            timeout: Duration::from_secs(5),
        });

        match model.generate("castle").await {
            Err(ProviderError::Status { code, body, .. }) => {
                assert_eq!(code, 400);
                assert_eq!(body, "invalid inputs");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }
}
