//! Remote generation collaborators and their wire types.
//!
//! Both services are hosted functions that take a JSON body and answer with
//! JSON. Any failure (transport, non-2xx status, an `error` field in the
//! body, an unreadable body) is turned into an [`EdgeFunctionError`] by
//! [`classify`] so the retry layer can decide what to do with it.

use crate::imaging::embed::is_embedded;
use crate::retry::{EdgeFunctionError, classify};
use crate::types::Slide;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const TEXT_FUNCTION: &str = "generate-carousel";
pub const IMAGE_FUNCTION: &str = "generate-image";

/// Body of a text generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub username: String,
    pub content: String,
    pub instagram_handle: String,
    pub is_verified: bool,
    pub slide_count: u32,
    pub content_type: String,
    pub content_format: String,
    pub call_to_action: String,
    #[serde(rename = "customCTA", skip_serializing_if = "Option::is_none")]
    pub custom_cta: Option<String>,
    pub copywriting_framework: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
}

/// What the text generator returns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedContent {
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Body of an image generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// `WxH`
    pub size: String,
    pub quality: String,
}

/// Accepts `{url}`, `{b64_json}` and `{data: [{url | b64_json}]}`.
#[derive(Debug, Default, Deserialize)]
struct ImagePayload {
    url: Option<String>,
    b64_json: Option<String>,
    #[serde(default)]
    data: Vec<ImagePayload>,
}

impl ImagePayload {
    fn into_reference(self) -> Option<String> {
        if let Some(url) = self.url.filter(|u| !u.trim().is_empty()) {
            return Some(url);
        }
        if let Some(b64) = self.b64_json.filter(|b| !b.trim().is_empty()) {
            return Some(if is_embedded(&b64) {
                b64
            } else {
                format!("data:image/png;base64,{b64}")
            });
        }
        self.data.into_iter().find_map(ImagePayload::into_reference)
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<GeneratedContent, EdgeFunctionError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return a reference to it (URL or data URL).
    async fn generate(&self, request: &ImageRequest) -> Result<String, EdgeFunctionError>;
}

/// Shared JSON-over-HTTP call for both functions.
#[derive(Debug, Clone)]
struct EdgeFunction {
    name: &'static str,
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl EdgeFunction {
    async fn call<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<R, EdgeFunctionError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                format!("network error: {e}")
            };
            classify(self.name, &message, None)
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(self.name, &format!("network error: {e}"), Some(status.as_u16())))?;
        let value: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);

        if let Some(message) = error_message(&value) {
            return Err(classify(self.name, &message, Some(status.as_u16())));
        }
        if !status.is_success() {
            let message = if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            };
            return Err(classify(self.name, &message, Some(status.as_u16())));
        }
        serde_json::from_value(value)
            .map_err(|e| classify(self.name, &format!("unreadable response: {e}"), None))
    }
}

/// `error` as a string, or `error.message` as an object.
fn error_message(value: &serde_json::Value) -> Option<String> {
    match value.get("error")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o.get("message")?.as_str().map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    function: EdgeFunction,
}

impl HttpTextGenerator {
    pub fn new(client: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            function: EdgeFunction {
                name: TEXT_FUNCTION,
                client,
                url: url.into(),
                api_key,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, request: &TextRequest) -> Result<GeneratedContent, EdgeFunctionError> {
        self.function.call(request).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpImageGenerator {
    function: EdgeFunction,
}

impl HttpImageGenerator {
    pub fn new(client: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            function: EdgeFunction {
                name: IMAGE_FUNCTION,
                client,
                url: url.into(),
                api_key,
            },
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<String, EdgeFunctionError> {
        let payload: ImagePayload = self.function.call(request).await?;
        payload
            .into_reference()
            .ok_or_else(|| classify(IMAGE_FUNCTION, "response contained no image", None))
    }
}
