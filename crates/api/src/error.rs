use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use clearsight_core::llm::error::GenerationError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    RateLimited,
    NotFound(String),
    /// Another request or the batch is generating the same report.
    Conflict(String),
    DatabaseUnavailable,
    Generation(GenerationError),
    /// Snapshot source failures.
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Generation(GenerationError::UpstreamRateLimit { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Generation(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::NotFound(msg) | Self::Conflict(msg) => msg.clone(),
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::RateLimited => "Rate limit exceeded".to_string(),
            Self::DatabaseUnavailable => "Database unavailable".to_string(),
            Self::Generation(err) => err.to_string(),
            Self::Upstream(err) => format!("Snapshot source failed: {err:#}"),
            Self::Internal(_) => "Internal error".to_string(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self::Generation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Generation(err) => {
                tracing::error!(
                    kind = err.kind(),
                    stage = ?err.stage(),
                    error = %err,
                    "generation failed"
                );
            }
            Self::Upstream(err) | Self::Internal(err) => {
                sentry_anyhow::capture_anyhow(err);
                tracing::error!(%status, error = %format!("{err:#}"), "request failed");
            }
            _ => {}
        }

        let (kind, stage) = match &self {
            Self::Generation(err) => (Some(err.kind()), err.stage().map(|s| s.to_string())),
            _ => (None, None),
        };
        let body = ErrorBody {
            ok: false,
            error: self.message(),
            kind,
            stage,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearsight_core::llm::Provider;
    use clearsight_core::stages::StageName;

    #[test]
    fn upstream_rate_limit_is_service_unavailable() {
        let err = ApiError::from(GenerationError::UpstreamRateLimit {
            provider: Provider::OpenAI,
            attempts: 2,
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn other_generation_failures_are_bad_gateway() {
        let err = ApiError::from(GenerationError::StageOutputParse {
            stage: StageName::IssueDetector,
            detail: "expected value".to_string(),
            excerpt: "Sure!".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::DatabaseUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
