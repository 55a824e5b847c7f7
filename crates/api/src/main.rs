use anyhow::Context;

use taskmgr_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    taskmgr_observability::init(&config.logging);

    let services = taskmgr_api::app::services::build_services(&config).await?;
    let app = taskmgr_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
