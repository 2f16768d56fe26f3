use crate::config::Settings;
use crate::llm::json::excerpt;
use crate::llm::{ChatTransport, InvokeOptions, Provider, TransportError};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone)]
pub struct AnthropicTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicTransport {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url = settings
            .anthropic_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    fn headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key).map_err(|e| TransportError::Call {
            detail: format!("invalid Anthropic API key header: {e}"),
            raw_output: None,
        })?;
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    fn request(system_role: &str, user_content: &str, options: &InvokeOptions) -> CreateMessageRequest {
        // The messages API has no JSON response mode; the system prompt carries that instruction.
        CreateMessageRequest {
            model: options.model.clone(),
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
            system: Some(system_role.to_string()),
            messages: vec![Message {
                role: "user",
                content: user_content.to_string(),
            }],
        }
    }

    fn response_text(res: &CreateMessageResponse) -> Option<String> {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => out.push_str(text),
                ContentBlock::Unknown => {}
            }
        }
        (!out.is_empty()).then_some(out)
    }
}

#[async_trait::async_trait]
impl ChatTransport for AnthropicTransport {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<Option<String>, TransportError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let req = Self::request(system_role, user_content, options);

        let res = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Call {
                detail: format!("Anthropic request failed: {e}"),
                raw_output: None,
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| TransportError::Call {
            detail: format!("failed to read Anthropic response body: {e}"),
            raw_output: None,
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                detail: format!("status={status} body={}", excerpt(&text)),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Call {
                detail: format!("status={status}"),
                raw_output: Some(text),
            });
        }

        let parsed = serde_json::from_str::<CreateMessageResponse>(&text).map_err(|e| {
            TransportError::Call {
                detail: format!("failed to decode Anthropic response: {e}"),
                raw_output: Some(text.clone()),
            }
        })?;

        if matches!(parsed.stop_reason.as_deref(), Some("max_tokens")) {
            tracing::warn!(
                model = %options.model,
                max_tokens = options.max_output_tokens,
                "Anthropic stop_reason=max_tokens; output is likely truncated"
            );
        }

        Ok(Self::response_text(&parsed))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Unknown,
}
