use anyhow::{Context, Result};
use api::{AppConfig, AppState, build_providers, get_credentials, http_client, init_tracing, router};
use ingest::SheetReader;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.server.log_json);

    let credentials = get_credentials()?;
    if let Some(path) = &credentials.sheet_credentials {
        tracing::info!(
            path = %path.display(),
            "Sheet credentials configured but unused, only public sheets are fetched"
        );
    }

    // Fail fast on a bad default template or parameter
    config
        .pipeline
        .validate()
        .context("Invalid pipeline defaults")?;

    let client = http_client()?;
    let providers = build_providers(&config, &credentials, client.clone());

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        providers,
        config.pipeline.clone(),
        SheetReader::new(client),
        shutdown.clone(),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down, cancelling unstarted entities");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}
