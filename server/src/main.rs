use anyhow::Context;
use jobpoll_server::{app, config::ServerConfig, state::AppState};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const REAPER_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobpoll_server=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppState::new(config.session_key.clone());
    let retention = chrono::Duration::from_std(config.job_retention)
        .context("JOB_RETENTION_SECS out of range")?;
    state.spawn_reaper(REAPER_PERIOD, retention);
    let app = app(state, config.client_url.as_deref());

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("job API listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
