use crate::error::ApiError;
use crate::rate_limit::{client_identifier, RateLimiter};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use clearsight_core::domain::report::{
    DailyReportPayload, IssueScan, Lead, OutreachDraft, SupportReply, SupportRequest,
};
use clearsight_core::domain::snapshot::RawOperationalSnapshot;
use clearsight_core::ingest::demo::DEMO_CLIENT_ID;
use clearsight_core::ingest::SnapshotSources;
use clearsight_core::pipeline::Pipeline;
use clearsight_core::storage::lock::{self, LockScope, ReportLock};
use clearsight_core::storage::{clients, reports};
use clearsight_core::time::report_date::parse_report_date;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub sources: Arc<SnapshotSources>,
    pub pool: Option<PgPool>,
    pub limiter: Arc<RateLimiter>,
    /// Empty disables the `x-api-key` check.
    pub api_keys: Arc<[String]>,
    pub demo_mode: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/generate-daily-report", post(generate_daily_report))
        .route("/api/run-issue-detector", post(run_issue_detector))
        .route("/api/support/auto-reply", post(support_auto_reply))
        .route("/api/sales/personalize-outreach", post(personalize_outreach))
        .route("/api/sop", post(write_sop))
        .route("/api/reports/:client_id/:date", get(get_report))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    ok: bool,
    #[serde(flatten)]
    data: T,
    timestamp: DateTime<Utc>,
}

fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        ok: true,
        data,
        timestamp: Utc::now(),
    })
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDateRequest {
    pub client_id: String,
    pub date: String,
}

impl ClientDateRequest {
    fn validate(&self) -> Result<(Uuid, NaiveDate), ApiError> {
        let client_id = Uuid::parse_str(self.client_id.trim())
            .map_err(|_| ApiError::BadRequest("Invalid client ID".to_string()))?;
        let date = parse_report_date(&self.date)
            .map_err(|_| ApiError::BadRequest("Date must be in YYYY-MM-DD format".to_string()))?;
        Ok((client_id, date))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    markdown: String,
    payload: DailyReportPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_id: Option<Uuid>,
}

pub async fn generate_daily_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ClientDateRequest>, JsonRejection>,
) -> ApiResult<ReportResponse> {
    admit(&state, &headers).await?;
    let Json(req) = body.map_err(reject_body)?;
    let (client_id, date) = req.validate()?;
    ensure_known_client(&state, client_id).await?;

    let report_lock = lock_client_report(&state, client_id, date).await?;

    tracing::info!(%client_id, %date, "generating daily report");
    let snapshot = load_snapshot(&state, client_id, date).await?;
    let report = state.pipeline.run_daily_pipeline(&snapshot, date).await?;

    let mut report_id = None;
    if let Some(pool) = &state.pool {
        match reports::persist_report(pool, client_id, &report, state.pipeline.provider().as_str())
            .await
        {
            Ok(id) => report_id = Some(id),
            Err(e) => swallow_persist_error(&e, client_id, "report"),
        }
    }
    if let Some(report_lock) = report_lock {
        if let Err(e) = report_lock.release().await {
            tracing::warn!(%client_id, %date, error = %format!("{e:#}"), "report lock release failed");
        }
    }

    Ok(success(ReportResponse {
        markdown: report.narrative.into_inner(),
        payload: report.payload,
        report_id,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueScanResponse {
    #[serde(flatten)]
    scan: IssueScan,
    urgent_issues: usize,
}

/// KPI extraction and issue detection only. High and critical issues are stored.
pub async fn run_issue_detector(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ClientDateRequest>, JsonRejection>,
) -> ApiResult<IssueScanResponse> {
    admit(&state, &headers).await?;
    let Json(req) = body.map_err(reject_body)?;
    let (client_id, date) = req.validate()?;
    ensure_known_client(&state, client_id).await?;

    tracing::info!(%client_id, %date, "running issue detector");
    let snapshot = load_snapshot(&state, client_id, date).await?;
    let scan = state.pipeline.run_issue_detection(&snapshot).await?;

    let urgent: Vec<_> = scan
        .issues
        .iter()
        .filter(|i| i.severity.is_urgent())
        .cloned()
        .collect();
    if let (Some(pool), false) = (&state.pool, urgent.is_empty()) {
        match reports::persist_issues(pool, client_id, &urgent).await {
            Ok(n) => tracing::info!(%client_id, saved = n, "urgent issues saved"),
            Err(e) => swallow_persist_error(&e, client_id, "issues"),
        }
    }

    Ok(success(IssueScanResponse {
        urgent_issues: urgent.len(),
        scan,
    }))
}

pub async fn support_auto_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SupportRequest>, JsonRejection>,
) -> ApiResult<SupportReply> {
    admit(&state, &headers).await?;
    let Json(req) = body.map_err(reject_body)?;
    if req.subject.trim().is_empty() || req.body.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "subject and body are required".to_string(),
        ));
    }

    let reply = state.pipeline.draft_support_reply(&req).await?;
    Ok(success(reply))
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutreachRequest {
    #[serde(default)]
    pub lead: Option<Lead>,
    #[serde(default)]
    pub template: Option<String>,
}

pub async fn personalize_outreach(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<OutreachRequest>, JsonRejection>,
) -> ApiResult<OutreachDraft> {
    admit(&state, &headers).await?;
    let Json(req) = body.map_err(reject_body)?;
    let template = req.template.as_deref().map(str::trim).unwrap_or_default();
    let (Some(lead), false) = (req.lead.as_ref(), template.is_empty()) else {
        return Err(ApiError::BadRequest(
            "lead and template are required".to_string(),
        ));
    };

    tracing::info!(lead = %lead.display_name(), %template, "personalizing outreach");
    let draft = state.pipeline.personalize_outreach(lead, template).await?;
    Ok(success(draft))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SopRequest {
    pub topic: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct SopResponse {
    sop: String,
}

pub async fn write_sop(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SopRequest>, JsonRejection>,
) -> ApiResult<SopResponse> {
    admit(&state, &headers).await?;
    let Json(req) = body.map_err(reject_body)?;
    if req.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("topic is required".to_string()));
    }

    let sop = state
        .pipeline
        .write_sop(req.topic.trim(), req.context.trim())
        .await?;
    Ok(success(SopResponse { sop }))
}

#[derive(Debug, Serialize)]
pub struct StoredReportResponse {
    report: reports::StoredReport,
}

pub async fn get_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((client_id, date)): Path<(String, String)>,
) -> ApiResult<StoredReportResponse> {
    admit(&state, &headers).await?;
    let (client_id, date) = ClientDateRequest { client_id, date }.validate()?;
    let Some(pool) = &state.pool else {
        return Err(ApiError::DatabaseUnavailable);
    };

    let report = reports::fetch_report(pool, client_id, date)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Report not found".to_string()))?;
    Ok(success(StoredReportResponse { report }))
}

/// Rate limit first, then the API key.
async fn admit(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let identifier = client_identifier(headers, &state.api_keys);
    if !state.limiter.check(&identifier).await {
        tracing::warn!(%identifier, "rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    if state.api_keys.is_empty() {
        return Ok(());
    }
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    match presented {
        Some(key) if state.api_keys.iter().any(|k| k == key) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Shares the worker's per-client lock. Without a usable database there is nothing to race on.
async fn lock_client_report(
    state: &AppState,
    client_id: Uuid,
    date: NaiveDate,
) -> Result<Option<ReportLock>, ApiError> {
    let Some(pool) = &state.pool else {
        return Ok(None);
    };
    match lock::try_acquire(pool, LockScope::ClientReport(client_id), date).await {
        Ok(Some(report_lock)) => Ok(Some(report_lock)),
        Ok(None) => Err(ApiError::Conflict(format!(
            "report for client {client_id} on {date} is already being generated"
        ))),
        Err(e) => {
            swallow_persist_error(&e, client_id, "report lock");
            Ok(None)
        }
    }
}

/// The demo tenant and demo mode skip the lookup; everyone else must be an active client.
async fn ensure_known_client(state: &AppState, client_id: Uuid) -> Result<(), ApiError> {
    if state.demo_mode || client_id == DEMO_CLIENT_ID {
        return Ok(());
    }
    let Some(pool) = &state.pool else {
        return Err(ApiError::DatabaseUnavailable);
    };
    if clients::client_exists(pool, client_id)
        .await
        .map_err(ApiError::Internal)?
    {
        Ok(())
    } else {
        Err(ApiError::NotFound("Client not found".to_string()))
    }
}

async fn load_snapshot(
    state: &AppState,
    client_id: Uuid,
    date: NaiveDate,
) -> Result<RawOperationalSnapshot, ApiError> {
    let source = state
        .sources
        .for_client(client_id)
        .map_err(ApiError::Upstream)?;
    source
        .fetch_snapshot(client_id, date)
        .await
        .map_err(ApiError::Upstream)
}

fn reject_body(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn swallow_persist_error(err: &anyhow::Error, client_id: Uuid, what: &str) {
    sentry_anyhow::capture_anyhow(err);
    tracing::error!(%client_id, what, error = %format!("{err:#}"), "persist failed; returning result anyway");
}
