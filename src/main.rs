use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{
    config::Config,
    routes::build_router,
    seed::{self, Fixture},
    services::sessions::sweep_expired,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    if let Some(path) = config.seed_file.as_deref() {
        let fixture = Fixture::load(path).await?;
        seed::apply(&state, &fixture).await?;
    }

    let app = build_router(state.clone())?;

    let sweep_state = state.clone();
    let sweep_every = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&sweep_state).await {
                tracing::error!("❌ Expiry sweep failed: {}", e);
            }
        }
    });

    tracing::info!("🚀 Server listening on http://{}", config.bind_addr);
    tracing::info!("✅ Expiry sweep started (every {}s)", config.sweep_interval_secs);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
