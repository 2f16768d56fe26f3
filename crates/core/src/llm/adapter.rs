use crate::llm::error::GenerationError;
use crate::llm::{ChatTransport, GenerationClient, InvokeOptions, Provider, TransportError};
use std::time::{Duration, Instant};

pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

/// Wraps a transport with the retry policy: one identical retry after a fixed delay when the
/// provider rate limits, nothing else is retried.
#[derive(Debug, Clone)]
pub struct GenerationAdapter<T> {
    transport: T,
    rate_limit_backoff: Duration,
}

impl<T: ChatTransport> GenerationAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn content_or_empty(&self, content: Option<String>) -> Result<String, GenerationError> {
        match content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerationError::EmptyResponse {
                provider: self.transport.provider(),
            }),
        }
    }

    fn call_error(&self, detail: String, raw_output: Option<String>) -> GenerationError {
        GenerationError::UpstreamCall {
            provider: self.transport.provider(),
            detail,
            raw_output,
        }
    }
}

#[async_trait::async_trait]
impl<T: ChatTransport> GenerationClient for GenerationAdapter<T> {
    fn provider(&self) -> Provider {
        self.transport.provider()
    }

    async fn invoke(
        &self,
        system_role: &str,
        user_content: &str,
        options: &InvokeOptions,
    ) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let first = self
            .transport
            .complete(system_role, user_content, options)
            .await;

        let result = match first {
            Ok(content) => content,
            Err(TransportError::Call { detail, raw_output }) => {
                tracing::error!(provider = %self.provider(), model = %options.model, %detail, "generation call failed");
                return Err(self.call_error(detail, raw_output));
            }
            Err(TransportError::RateLimited { detail }) => {
                tracing::warn!(
                    provider = %self.provider(),
                    model = %options.model,
                    backoff_ms = self.rate_limit_backoff.as_millis() as u64,
                    %detail,
                    "generation service rate limited; retrying once"
                );
                tokio::time::sleep(self.rate_limit_backoff).await;

                match self
                    .transport
                    .complete(system_role, user_content, options)
                    .await
                {
                    Ok(content) => content,
                    Err(TransportError::RateLimited { detail }) => {
                        tracing::error!(provider = %self.provider(), %detail, "generation service still rate limited after retry");
                        return Err(GenerationError::UpstreamRateLimit {
                            provider: self.provider(),
                            attempts: 2,
                        });
                    }
                    Err(TransportError::Call { detail, raw_output }) => {
                        return Err(self.call_error(detail, raw_output));
                    }
                }
            }
        };

        let text = self.content_or_empty(result)?;
        tracing::debug!(
            provider = %self.provider(),
            model = %options.model,
            chars = text.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "generation call complete"
        );
        Ok(text)
    }
}
