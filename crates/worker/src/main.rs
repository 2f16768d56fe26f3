use anyhow::Context;
use clap::Parser;
use clearsight_core::config::Settings;
use clearsight_core::ingest::demo::DEMO_CLIENT_ID;
use clearsight_core::ingest::SnapshotSources;
use clearsight_core::llm::{self, StageModels};
use clearsight_core::pipeline::Pipeline;
use clearsight_core::storage::clients;
use clearsight_core::storage::lock::{self, LockScope};
use clearsight_core::time::report_date::resolve_report_date;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod batch;

#[derive(Debug, Parser)]
#[command(name = "clearsight_worker")]
struct Args {
    /// Report date (YYYY-MM-DD). Defaults to today at REPORT_TZ_OFFSET_HOURS.
    #[arg(long)]
    date: Option<String>,

    /// Only run these clients (repeatable). Defaults to every active client.
    #[arg(long = "client-id")]
    client_ids: Vec<Uuid>,

    /// Use synthetic snapshots for every client.
    #[arg(long)]
    demo: bool,

    /// Generate without touching the database. Runs the demo client unless --client-id is given.
    #[arg(long)]
    dry_run: bool,

    /// Deadline for the whole batch.
    #[arg(long, default_value_t = 300)]
    batch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let date = resolve_report_date(
        args.date.as_deref(),
        chrono::Utc::now(),
        settings.report_tz_offset_hours,
    )?;

    let client = llm::client_from_settings(&settings).context("generation client setup failed")?;
    let pipeline = Pipeline::new(client, StageModels::from_settings(&settings));
    let sources = if args.demo || settings.demo_mode {
        SnapshotSources::demo_only()
    } else {
        SnapshotSources::from_settings(&settings)?
    };
    let timeout = Duration::from_secs(args.batch_timeout_secs.max(1));

    if args.dry_run {
        let client_ids = if args.client_ids.is_empty() {
            vec![DEMO_CLIENT_ID]
        } else {
            args.client_ids.clone()
        };
        let ctx = batch::BatchContext {
            pipeline: &pipeline,
            sources: &sources,
            pool: None,
        };
        let summary = batch::run_batch(&ctx, &client_ids, date, timeout).await;
        log_summary(date, &summary, true);
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    clearsight_core::storage::migrate(&pool).await?;

    let Some(batch_lock) = lock::try_acquire(&pool, LockScope::DailyBatch, date).await? else {
        tracing::warn!(%date, "batch lock not acquired; another run in progress");
        return Ok(());
    };

    let result = run_locked(&args, &pipeline, &sources, &pool, date, timeout).await;

    if let Err(e) = batch_lock.release().await {
        tracing::warn!(%date, error = %format!("{e:#}"), "batch lock release failed");
    }

    let summary = result?;
    log_summary(date, &summary, false);
    anyhow::ensure!(
        !summary.timed_out,
        "batch for {date} timed out after {}s ({} clients skipped)",
        timeout.as_secs(),
        summary.skipped()
    );
    Ok(())
}

async fn run_locked(
    args: &Args,
    pipeline: &Pipeline,
    sources: &SnapshotSources,
    pool: &sqlx::PgPool,
    date: chrono::NaiveDate,
    timeout: Duration,
) -> anyhow::Result<batch::BatchSummary> {
    let client_ids = if args.client_ids.is_empty() {
        clients::list_active_clients(pool)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect()
    } else {
        args.client_ids.clone()
    };

    if client_ids.is_empty() {
        tracing::warn!(%date, "no active clients; nothing to do");
    }

    let ctx = batch::BatchContext {
        pipeline,
        sources,
        pool: Some(pool),
    };
    Ok(batch::run_batch(&ctx, &client_ids, date, timeout).await)
}

fn log_summary(date: chrono::NaiveDate, summary: &batch::BatchSummary, dry_run: bool) {
    tracing::info!(
        %date,
        dry_run,
        total = summary.total,
        processed = summary.processed(),
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped(),
        timed_out = summary.timed_out,
        "batch complete"
    );
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
