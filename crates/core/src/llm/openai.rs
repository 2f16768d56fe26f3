use crate::config::Settings;
use crate::llm::json::excerpt;
use crate::llm::{ChatTransport, InvokeOptions, Provider, TransportError};
use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url = settings
            .openai_base_url
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

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request(system_role: &str, user_content: &str, options: &InvokeOptions) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: options.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: system_role.to_string(),
                },
                Message {
                    role: "user",
                    content: user_content.to_string(),
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            response_format: options
                .strict_json_mode
                .then_some(ResponseFormat::JsonObject),
        }
    }

    fn first_choice_text(res: ChatCompletionResponse) -> Option<String> {
        res.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

#[async_trait::async_trait]
impl ChatTransport for OpenAiTransport {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn complete(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<Option<String>, TransportError> {
        let req = Self::request(system_role, user_content, options);

        let res = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Call {
                detail: if e.is_timeout() {
                    format!("OpenAI request timed out: {e}")
                } else {
                    format!("OpenAI request failed: {e}")
                },
                raw_output: None,
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| TransportError::Call {
            detail: format!("failed to read OpenAI response body: {e}"),
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

        let parsed = serde_json::from_str::<ChatCompletionResponse>(&text).map_err(|e| {
            TransportError::Call {
                detail: format!("failed to decode OpenAI response: {e}"),
                raw_output: Some(text.clone()),
            }
        })?;
        Ok(Self::first_choice_text(parsed))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ResponseFormat {
    #[serde(rename = "json_object")]
    JsonObject,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
