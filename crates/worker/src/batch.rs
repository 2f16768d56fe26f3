use chrono::NaiveDate;
use clearsight_core::ingest::SnapshotSources;
use clearsight_core::llm::error::GenerationError;
use clearsight_core::pipeline::Pipeline;
use clearsight_core::storage::lock::{self, LockScope};
use clearsight_core::storage::reports;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Dependencies for one batch run. `pool: None` is a dry run.
pub struct BatchContext<'a> {
    pub pipeline: &'a Pipeline,
    pub sources: &'a SnapshotSources,
    pub pool: Option<&'a PgPool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: bool,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }

    /// Clients never reached because the batch deadline passed.
    pub fn skipped(&self) -> usize {
        self.total - self.processed()
    }
}

/// Runs clients one after another. The deadline covers the whole batch, not each client.
pub async fn run_batch(
    ctx: &BatchContext<'_>,
    clients: &[Uuid],
    date: NaiveDate,
    timeout: Duration,
) -> BatchSummary {
    let mut summary = BatchSummary {
        total: clients.len(),
        ..Default::default()
    };

    let run = async {
        for &client_id in clients {
            if process_client(ctx, client_id, date).await {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
        }
    };
    if tokio::time::timeout(timeout, run).await.is_err() {
        summary.timed_out = true;
        tracing::error!(
            %date,
            timeout_secs = timeout.as_secs(),
            skipped = summary.skipped(),
            "batch timed out"
        );
    }

    summary
}

/// Holds the client's report lock around generation so an API request for the same client and
/// day cannot write a second report.
async fn process_client(ctx: &BatchContext<'_>, client_id: Uuid, date: NaiveDate) -> bool {
    let Some(pool) = ctx.pool else {
        return generate_and_store(ctx, client_id, date).await;
    };

    let client_lock = match lock::try_acquire(pool, LockScope::ClientReport(client_id), date).await {
        Ok(Some(client_lock)) => client_lock,
        Ok(None) => {
            tracing::warn!(%client_id, %date, "client report already being generated; skipping");
            return false;
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%client_id, %date, error = %format!("{err:#}"), "client lock failed");
            return false;
        }
    };

    let ok = generate_and_store(ctx, client_id, date).await;
    if let Err(e) = client_lock.release().await {
        tracing::warn!(%client_id, %date, error = %format!("{e:#}"), "client lock release failed");
    }
    ok
}

async fn generate_and_store(ctx: &BatchContext<'_>, client_id: Uuid, date: NaiveDate) -> bool {
    let t0 = Instant::now();

    let snapshot = match ctx.sources.for_client(client_id) {
        Ok(source) => source.fetch_snapshot(client_id, date).await,
        Err(e) => Err(e),
    };
    let snapshot = match snapshot {
        Ok(s) => s,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%client_id, %date, error = %format!("{err:#}"), "snapshot fetch failed");
            record_failure(ctx, client_id, date, "snapshot_fetch", &format!("{err:#}"), None).await;
            return false;
        }
    };

    match ctx.pipeline.run_daily_pipeline(&snapshot, date).await {
        Ok(report) => {
            let Some(pool) = ctx.pool else {
                tracing::info!(
                    %client_id,
                    %date,
                    dry_run = true,
                    narrative_chars = report.narrative.as_str().chars().count(),
                    "report generated (not persisted)"
                );
                return true;
            };
            let provider = ctx.pipeline.provider();
            match reports::persist_report(pool, client_id, &report, provider.as_str()).await {
                Ok(report_id) => {
                    tracing::info!(
                        %client_id,
                        %date,
                        %report_id,
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "report generated"
                    );
                    true
                }
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(%client_id, %date, error = %format!("{err:#}"), "report persist failed");
                    false
                }
            }
        }
        Err(err) => {
            sentry::capture_error(&err);
            tracing::error!(
                %client_id,
                %date,
                kind = err.kind(),
                stage = ?err.stage(),
                error = %err,
                "daily pipeline failed"
            );
            record_failure(
                ctx,
                client_id,
                date,
                err.kind(),
                &err.to_string(),
                raw_output_json(&err),
            )
            .await;
            false
        }
    }
}

async fn record_failure(
    ctx: &BatchContext<'_>,
    client_id: Uuid,
    date: NaiveDate,
    kind: &str,
    error: &str,
    raw_output: Option<Value>,
) {
    let Some(pool) = ctx.pool else {
        return;
    };
    let provider = ctx.pipeline.provider();
    if let Err(e) =
        reports::persist_failure(pool, client_id, date, provider.as_str(), kind, error, raw_output)
            .await
    {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(%client_id, %date, error = %format!("{e:#}"), "failure record persist failed");
    }
}

/// Whatever the model sent back, as JSON when it parses and wrapped as text otherwise.
fn raw_output_json(err: &GenerationError) -> Option<Value> {
    let raw = err.raw_output()?;
    serde_json::from_str(raw)
        .ok()
        .or_else(|| Some(json!({ "raw_text": raw })))
}
