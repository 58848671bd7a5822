mod config;
mod dto;
mod handlers;
mod identity;
mod models;
mod notify;
mod repository;
mod service;
mod view;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
};

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::StoreConfig;
use handlers::rest::{self, AppState};
use identity::IdentityProvider;
use notify::Inbox;
use repository::{MemoryStore, PgStore, RemoteStore};
use service::NoteService;

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt::init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to load config: {e}");
    });
    tracing::info!("Successfully loaded notes-sync config");

    // Remote store creation and migration
    let store: Arc<dyn RemoteStore> = match &cfg.store {
        StoreConfig::Postgres { dsn } => {
            let mut repo = PgStore::new(dsn).await.unwrap_or_else(|e| {
                tracing::error!("Failed to establish database connection: {e}");
                panic!("failed to establish database connection: {e}");
            });

            repo.migrate().await.unwrap_or_else(|e| {
                tracing::error!("Failed to migrate database: {e}");
                panic!("failed to migrate database: {e}");
            });

            Arc::new(repo)
        }
        StoreConfig::Memory => {
            tracing::warn!("Using the in-memory store, notes are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    // Service creation
    let inbox = Arc::new(Inbox::new(cfg.notification_capacity));
    let service = Arc::new(NoteService::new(
        store,
        inbox.clone(),
        cfg.default_note_title.clone(),
    ));

    // Identity changes drive cache loads
    let identity = IdentityProvider::new();
    let _listener = identity::spawn_listener(service.clone(), identity.subscribe());

    let state = Arc::new(AppState {
        service,
        identity,
        inbox,
    });

    // Router config
    let router = Router::new()
        .route("/", any(root))
        .merge(rest::router(state))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", rest::ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {e}", cfg.listen_addr);
            panic!("failed to bind to {}: {e}", cfg.listen_addr);
        });

    match listener.local_addr() {
        Ok(addr) => tracing::info!("notes-sync starting, listening on {}", addr),
        Err(e) => tracing::warn!("notes-sync starting, local address unknown: {e}"),
    }

    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("HTTP server error: {e}");
        panic!("failed to start HTTP server: {e}");
    }
}

async fn root() -> Response {
    (StatusCode::OK, "notes-sync").into_response()
}
