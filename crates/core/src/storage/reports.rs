use crate::domain::report::{DailyReport, DetectedIssue, RecommendedAction};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: Uuid,
    pub client_id: Uuid,
    pub report_date: NaiveDate,
    pub provider: String,
    pub subject: Option<String>,
    pub body_markdown: Option<String>,
    pub kpi_summary: Option<Value>,
    pub issues_summary: Option<Value>,
    pub actions: Option<Value>,
    pub generated_at: DateTime<Utc>,
}

/// Writes the report row plus its issues and actions atomically.
pub async fn persist_report(
    pool: &sqlx::PgPool,
    client_id: Uuid,
    report: &DailyReport,
    provider: &str,
) -> anyhow::Result<Uuid> {
    let payload = &report.payload;
    let kpis = serde_json::to_value(&payload.kpis).expect("kpis serialize failed");
    let issues = serde_json::to_value(&payload.issues).expect("issues serialize failed");
    let actions = serde_json::to_value(&payload.actions).expect("actions serialize failed");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let report_id: Uuid = sqlx::query_scalar(
        "INSERT INTO reports (client_id, report_type, report_date, status, provider, subject, body_markdown, \
                              kpi_summary, issues_summary, actions) \
         VALUES ($1, 'daily', $2, 'success', $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(client_id)
    .bind(payload.date)
    .bind(provider)
    .bind(report.subject())
    .bind(report.narrative.as_str())
    .bind(kpis)
    .bind(issues)
    .bind(actions)
    .fetch_one(&mut *tx)
    .await
    .context("insert reports failed")?;

    for issue in &payload.issues {
        insert_issue(&mut tx, client_id, Some(report_id), issue).await?;
    }
    for action in &payload.actions {
        insert_action(&mut tx, client_id, report_id, action).await?;
    }

    tx.commit().await.context("commit transaction failed")?;

    tracing::info!(
        %client_id,
        %report_id,
        date = %payload.date,
        issues = payload.issues.len(),
        actions = payload.actions.len(),
        "report persisted"
    );
    Ok(report_id)
}

/// Records a failed run. `raw_output` carries whatever the model returned, for diagnosis.
pub async fn persist_failure(
    pool: &sqlx::PgPool,
    client_id: Uuid,
    report_date: NaiveDate,
    provider: &str,
    error_kind: &str,
    error: &str,
    raw_output: Option<Value>,
) -> anyhow::Result<Uuid> {
    let report_id: Uuid = sqlx::query_scalar(
        "INSERT INTO reports (client_id, report_type, report_date, status, provider, error_kind, error, raw_output) \
         VALUES ($1, 'daily', $2, 'error', $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(client_id)
    .bind(report_date)
    .bind(provider)
    .bind(error_kind)
    .bind(error)
    .bind(raw_output)
    .fetch_one(pool)
    .await
    .context("insert error reports failed")?;

    Ok(report_id)
}

/// Stores issues found outside a full report run (no parent report row).
pub async fn persist_issues(
    pool: &sqlx::PgPool,
    client_id: Uuid,
    issues: &[DetectedIssue],
) -> anyhow::Result<u64> {
    if issues.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("begin transaction failed")?;
    for issue in issues {
        insert_issue(&mut tx, client_id, None, issue).await?;
    }
    tx.commit().await.context("commit transaction failed")?;

    Ok(issues.len() as u64)
}

/// Latest successful report for the client and date.
pub async fn fetch_report(
    pool: &sqlx::PgPool,
    client_id: Uuid,
    report_date: NaiveDate,
) -> anyhow::Result<Option<StoredReport>> {
    sqlx::query_as::<_, StoredReport>(
        "SELECT id, client_id, report_date, provider, subject, body_markdown, \
                kpi_summary, issues_summary, actions, generated_at \
         FROM reports \
         WHERE client_id = $1 AND report_date = $2 AND status = 'success' \
         ORDER BY generated_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .bind(client_id)
    .bind(report_date)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select report failed (client_id={client_id}, date={report_date})"))
}

async fn insert_issue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    client_id: Uuid,
    report_id: Option<Uuid>,
    issue: &DetectedIssue,
) -> anyhow::Result<()> {
    let data = (!issue.metadata.is_empty()).then(|| Value::Object(issue.metadata.clone()));

    sqlx::query(
        "INSERT INTO issues (client_id, report_id, severity, title, description, data) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(client_id)
    .bind(report_id)
    .bind(issue.severity.as_str())
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(data)
    .execute(&mut **tx)
    .await
    .context("insert issues failed")?;

    Ok(())
}

async fn insert_action(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    client_id: Uuid,
    report_id: Uuid,
    action: &RecommendedAction,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO actions (client_id, report_id, title, description, impact_score, confidence) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(client_id)
    .bind(report_id)
    .bind(&action.title)
    .bind(&action.description)
    .bind(action.impact_score)
    .bind(action.confidence)
    .execute(&mut **tx)
    .await
    .context("insert actions failed")?;

    Ok(())
}
