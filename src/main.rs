use aerovitals_backend::{api, chat::ChatRelay, config::Config, registry::ModelRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load()?;

    let models = ModelRegistry::load(&cfg)?;

    let chat = ChatRelay::new(&cfg)?;
    if !chat.has_key() {
        tracing::warn!("GROQ_API_KEY not set; /chat will answer with a configuration error");
    }

    let app = api::router(api::AppState::new(models, chat, cfg.log_features));

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
