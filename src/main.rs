//! # Social Chat Server
//!
//! Entry point: tracing, configuration, storage, then the HTTP/WebSocket
//! server.

use anyhow::Result;
use tracing::info;

use social_chat::config::Settings;
use social_chat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    social_chat::telemetry::init_tracing();

    info!("Starting Social Chat server...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        backend = ?settings.database.backend,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
