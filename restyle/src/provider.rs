//! Image-generation provider boundary.
//!
//! [`ImageGenerator`] is the seam the orchestrator calls through; the shipped
//! implementation targets the OpenAI `images/edits` endpoint. The client's
//! own timeout is the inner deadline; there is no other cancellation of an
//! in-flight provider call.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;

/// Payload submitted to the provider: a normalized PNG plus the effective
/// prompt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image_png: Vec<u8>,
    pub prompt: String,
    pub size: String,
    pub count: u32,
}

impl GenerationRequest {
    pub fn new(image_png: Vec<u8>, prompt: String) -> Self {
        Self {
            image_png,
            prompt,
            size: "1024x1024".to_string(),
            count: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("provider call exceeded its deadline")]
    Timeout,
    #[error("provider rate limit hit")]
    RateLimited,
    #[error("provider returned no image data")]
    NoResult,
    #[error("provider request failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn edit(&self, request: GenerationRequest) -> Result<GeneratedImage, GenerationError>;
}

/// OpenAI `images/edits` client.
pub struct OpenAiImages {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiImages {
    /// `timeout` is the inner deadline for each provider call; it must be
    /// shorter than the outer request timeout so this failure is reported
    /// before the request deadline fires.
    pub fn new(
        api_base: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/images/edits", api_base.trim_end_matches('/')),
            api_key,
            model,
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<GeneratedImage, GenerationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(GenerationError::Upstream(format!(
                "result download failed with status {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    async fn edit(&self, request: GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        let image_part = reqwest::multipart::Part::bytes(request.image_png)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("image", image_part)
            .text("prompt", request.prompt)
            .text("size", request.size)
            .text("n", request.count.to_string())
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!(
                "{}: {}",
                status,
                truncate(&body, 512)
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Upstream(format!("unparseable response: {e}")))?;

        let first = payload.get("data").and_then(|data| data.get(0));
        if let Some(b64) = first
            .and_then(|item| item.get("b64_json"))
            .and_then(|v| v.as_str())
        {
            let bytes = BASE64
                .decode(b64)
                .map_err(|e| GenerationError::Upstream(format!("invalid base64 payload: {e}")))?;
            return Ok(GeneratedImage { bytes });
        }

        // Some responses carry a download URL instead of inline data.
        if let Some(url) = first
            .and_then(|item| item.get("url"))
            .and_then(|v| v.as_str())
        {
            return self.fetch_url(url).await;
        }

        Err(GenerationError::NoResult)
    }
}

fn map_transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Upstream(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
