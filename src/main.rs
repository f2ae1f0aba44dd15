//! Stock News Notifier — Binary Entrypoint
//! Boots the Axum HTTP server and the daily pipeline scheduler.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stock_news_notifier::api::{create_router, AppState};
use stock_news_notifier::config::AppConfig;
use stock_news_notifier::db::Database;
use stock_news_notifier::notify::expo::ExpoPush;
use stock_news_notifier::producer::openai::OpenAiNewsProducer;
use stock_news_notifier::scheduler::{PipelineCtx, PipelineScheduler};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stock_news_notifier=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;
    let db = Database::open(&config.database_path)
        .await
        .context("opening database")?;

    let producer = Arc::new(OpenAiNewsProducer::new(None));
    let transport = Arc::new(ExpoPush::new(config.expo_access_token.clone()));

    let ctx = PipelineCtx::new(db.clone(), producer, transport.clone());
    let scheduler = Arc::new(PipelineScheduler::new(
        ctx,
        config.schedule_times.clone(),
        config.schedule_tz,
    ));
    scheduler.start();

    let state = AppState {
        db,
        scheduler,
        transport,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await.context("server error")
}
