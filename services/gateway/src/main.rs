use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gateway::audit::{AuditSink, JournalAudit, NoopAudit};
use gateway::config::{GatewayConfig, DEFAULT_AUDIT_QUEUE};
use gateway::{create_router, AppState};
use market_data::replay::ReplaySource;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,market_data=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::parse();
    tracing::info!(bind = %config.bind, "Starting order book stream gateway");

    let audit: Arc<dyn AuditSink> = match &config.audit_log {
        Some(path) => {
            let (journal, _writer) = JournalAudit::open(path, DEFAULT_AUDIT_QUEUE)
                .await
                .with_context(|| format!("opening audit log {}", path.display()))?;
            Arc::new(journal)
        }
        None => Arc::new(NoopAudit),
    };

    let state = AppState::new(config.clone(), audit).context("invalid symbol allowlist")?;

    let reaper = Arc::clone(&state.registry).spawn_reaper(config.reap_interval(), config.attach_timeout());

    if let Some(path) = &config.replay_file {
        let source = ReplaySource::open(path, config.replay_pace()).await?;
        let dispatcher = Arc::clone(&state.dispatcher);
        tokio::spawn(async move {
            dispatcher.run_source(source).await;
        });
    } else {
        tracing::warn!("No market data source configured; sessions will wait for data");
    }

    let app = create_router(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;

    tracing::info!("Listening on {}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    reaper.abort();
    Ok(())
}
