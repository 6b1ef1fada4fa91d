//! Application Startup
//!
//! Application building and server initialization.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::application::services::Services;
use crate::config::{Settings, StorageBackend};
use crate::infrastructure::{database, Repositories};
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::middleware::create_cors_layer;
use crate::presentation::websocket::{Gateway, Hub};
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub hub: Arc<Hub>,
    pub settings: Arc<Settings>,
    /// Present only for the postgres backend; used by readiness checks
    pub db: Option<PgPool>,
}

impl AppState {
    /// Open the configured store and wire every service over it.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let (repositories, db) = match settings.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; state is lost on restart");
                (Repositories::in_memory(), None)
            }
            StorageBackend::Postgres => {
                let pool = database::connect(&settings.database).await?;
                (Repositories::postgres(pool.clone()), Some(pool))
            }
        };
        Ok(Self::with_repositories(settings, repositories, db))
    }

    pub fn with_repositories(
        settings: Settings,
        repositories: Repositories,
        db: Option<PgPool>,
    ) -> Self {
        let snowflake = Arc::new(SnowflakeGenerator::new(u64::from(
            settings.snowflake.machine_id,
        )));
        let services = Services::new(&repositories, snowflake, settings.messaging.clone());
        let hub = Arc::new(Hub::new(
            Arc::new(Gateway::new()),
            services.clone(),
            &settings.messaging,
        ));

        Self {
            services,
            hub,
            settings: Arc::new(settings),
            db,
        }
    }
}

/// The full router with tracing and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.settings.cors);
    routes::create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();
        let addr = settings.server_addr();
        let state = AppState::from_settings(settings).await?;
        let router = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
