use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use journal_auth::config::{CALLBACK_PATH, CLIENT_METADATA_PATH};
use journal_auth::IdentityService;
use journal_store::{Database, EntryRepo};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub entries: Arc<EntryRepo>,
    pub identity: IdentityService,
}

impl AppState {
    pub fn new(db: Database, identity: IdentityService) -> Self {
        Self {
            entries: Arc::new(EntryRepo::new(db.clone())),
            db,
            identity,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(CLIENT_METADATA_PATH, get(handlers::client_metadata))
        .route("/auth/login", post(handlers::login))
        .route(CALLBACK_PATH, get(handlers::callback))
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/api/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route("/api/entries/{public_id}", get(handlers::get_entry))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle to shut the server down.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "journal server started");

    let token = CancellationToken::new();
    let shutdown = token.clone().cancelled_owned();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        token,
        server,
        shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
    })
}

/// Handle returned by `start()`; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    token: CancellationToken,
    server: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl ServerHandle {
    /// Token that stops the server when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting connections and wait for in-flight requests,
    /// aborting the server task if they outlast the shutdown timeout.
    pub async fn shutdown(self) {
        self.token.cancel();
        let abort = self.server.abort_handle();
        if tokio::time::timeout(self.shutdown_timeout, self.server)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "shutdown timed out, aborting server task"
            );
            abort.abort();
        }
        tracing::info!("journal server stopped");
    }
}
