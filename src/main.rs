use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up BACKEND_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Missing backend settings are startup-fatal
    let config = fret_api::config::init_from_env()
        .context("invalid configuration; set BACKEND_URL and BACKEND_ANON_KEY")?;
    tracing::info!("Using backend at {}", config.backend_url);

    let app = fret_api::app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("FRET_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Fret API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
