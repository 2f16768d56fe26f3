pub mod adapter;
pub mod anthropic;
pub mod error;
pub mod json;
pub mod openai;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Settings;
use crate::llm::error::GenerationError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call request knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub model: String,
    /// Always within [0, 1].
    pub temperature: f32,
    /// Always >= 1.
    pub max_output_tokens: u32,
    pub strict_json_mode: bool,
}

impl InvokeOptions {
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            strict_json_mode: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = if temperature.is_finite() {
            temperature.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_TEMPERATURE
        };
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens.max(1);
        self
    }

    pub fn strict_json(mut self, on: bool) -> Self {
        self.strict_json_mode = on;
        self
    }
}

/// Which model each stage runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageModels {
    /// Used by every stage that writes or reasons.
    pub primary: String,
    /// Used for the mechanical KPI extraction.
    pub fast: String,
}

impl StageModels {
    pub fn defaults_for(provider: Provider) -> Self {
        match provider {
            Provider::OpenAI => Self {
                primary: "gpt-4o".to_string(),
                fast: "gpt-4o-mini".to_string(),
            },
            Provider::Anthropic => Self {
                primary: "claude-3-5-sonnet-latest".to_string(),
                fast: "claude-3-5-haiku-latest".to_string(),
            },
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut out = Self::defaults_for(settings.llm_provider);
        if let Some(m) = settings.llm_primary_model.clone() {
            out.primary = m;
        }
        if let Some(m) = settings.llm_fast_model.clone() {
            out.fast = m;
        }
        out
    }
}

/// Failure signalled by a provider transport, before retry policy is applied.
#[derive(Debug, Clone)]
pub enum TransportError {
    RateLimited {
        detail: String,
    },
    Call {
        detail: String,
        raw_output: Option<String>,
    },
}

/// One HTTP round trip to a provider. No retries at this level.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    fn provider(&self) -> Provider;

    /// Returns the first completion's text, or `None` when the provider answered without any.
    async fn complete(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<Option<String>, TransportError>;
}

/// The single seam every stage calls through.
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn invoke(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<String, GenerationError>;
}

/// Builds the configured provider behind the retrying adapter.
pub fn client_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn GenerationClient>> {
    let backoff = Duration::from_millis(settings.llm_rate_limit_backoff_ms);
    let client: Arc<dyn GenerationClient> = match settings.llm_provider {
        Provider::OpenAI => {
            let transport = openai::OpenAiTransport::from_settings(settings)?;
            Arc::new(adapter::GenerationAdapter::new(transport).with_rate_limit_backoff(backoff))
        }
        Provider::Anthropic => {
            let transport = anthropic::AnthropicTransport::from_settings(settings)?;
            Arc::new(adapter::GenerationAdapter::new(transport).with_rate_limit_backoff(backoff))
        }
    };
    Ok(client)
}
