use crate::llm::Provider;
use crate::stages::StageName;

/// Everything the pipeline can fail with. Nothing here is recovered from inside the core
/// except the single rate-limit retry in the adapter.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service returned no content (provider={provider})")]
    EmptyResponse { provider: Provider },

    #[error("generation service rate limited the request {attempts} times in a row (provider={provider})")]
    UpstreamRateLimit { provider: Provider, attempts: u32 },

    #[error("generation service call failed (provider={provider}): {detail}")]
    UpstreamCall {
        provider: Provider,
        detail: String,
        raw_output: Option<String>,
    },

    #[error("stage {stage} output is not valid JSON for its contract: {detail} (excerpt: {excerpt:?})")]
    StageOutputParse {
        stage: StageName,
        detail: String,
        excerpt: String,
    },

    #[error("stage {stage} output violates its contract: {detail}")]
    StageOutputValidation {
        stage: StageName,
        detail: String,
        excerpt: String,
    },
}

impl GenerationError {
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::StageOutputParse { stage, .. } | Self::StageOutputValidation { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Diagnostic text worth persisting next to a failed run.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::UpstreamCall { raw_output, .. } => raw_output.as_deref(),
            Self::StageOutputParse { excerpt, .. } | Self::StageOutputValidation { excerpt, .. } => {
                Some(excerpt)
            }
            _ => None,
        }
    }

    /// Short machine-readable label, used for log fields and stored error rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyResponse { .. } => "empty_response",
            Self::UpstreamRateLimit { .. } => "upstream_rate_limit",
            Self::UpstreamCall { .. } => "upstream_call",
            Self::StageOutputParse { .. } => "stage_output_parse",
            Self::StageOutputValidation { .. } => "stage_output_validation",
        }
    }
}
