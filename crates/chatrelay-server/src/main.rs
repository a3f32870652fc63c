mod configuration;
mod error;
mod routes;
mod state;

use chatrelay::providers::factory;
use configuration::Settings;
use state::AppState;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;

    // Create app state with the configured provider
    let provider = factory::get_provider(settings.provider.into_config())?;
    let state = AppState::new(provider, settings.chat);

    // Create router with CORS support
    let app = routes::configure(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
