use anyhow::Context;
use clearsight_core::config::Settings;
use clearsight_core::ingest::SnapshotSources;
use clearsight_core::llm::{self, StageModels};
use clearsight_core::pipeline::Pipeline;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod rate_limit;
mod routes;

use rate_limit::{RateLimitConfig, RateLimiter};
use routes::AppState;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match clearsight_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API without persistence");
            None
        }
    };

    let client = llm::client_from_settings(&settings).context("generation client setup failed")?;
    let pipeline = Pipeline::new(client, StageModels::from_settings(&settings));
    let sources = SnapshotSources::from_settings(&settings)?;

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_env()?));
    spawn_rate_limit_sweeper(limiter.clone());

    tracing::info!(
        provider = %pipeline.provider(),
        demo_mode = settings.demo_mode,
        api_keys = settings.api_keys.len(),
        persistence = pool.is_some(),
        "pipeline ready"
    );

    let state = AppState {
        pipeline,
        sources: Arc::new(sources),
        pool,
        limiter,
        api_keys: settings.api_keys.clone().into(),
        demo_mode: settings.demo_mode,
    };

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically drops expired rate-limit windows so idle callers don't accumulate.
fn spawn_rate_limit_sweeper(limiter: Arc<RateLimiter>) {
    let period = limiter.config().window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_expired().await;
            if evicted > 0 {
                tracing::debug!(evicted, "rate limit windows evicted");
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
