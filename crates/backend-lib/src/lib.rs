// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the boardsync whiteboard server.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod permalinks;
pub mod relay_actor;
pub mod seed;
pub mod storage;
pub mod teachers;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use crate::auth::AccessGuard;
use crate::config::{Settings, StorageBackend};
use crate::permalinks::PermalinkDirectory;
use crate::relay_actor::{spawn_relay, RelayHandle};
use crate::storage::{FlatFileStorage, PgStorage, Storage, UnavailableStorage};
use crate::teachers::TeacherDirectory;
use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Storage backend
    pub storage: Arc<dyn Storage>,
    /// Realtime relay
    pub relay: RelayHandle,
    pub guard: AccessGuard,
    pub permalinks: PermalinkDirectory,
    pub teachers: TeacherDirectory,
}

impl AppState {
    /// Create a new application state and start the relay actor
    pub fn new(storage: Arc<dyn Storage>, settings: Settings) -> Self {
        let guard = AccessGuard::new(settings.admin_token().map(str::to_string), storage.clone());
        Self {
            permalinks: PermalinkDirectory::new(storage.clone(), guard.clone()),
            teachers: TeacherDirectory::new(storage.clone()),
            relay: spawn_relay(),
            settings: Arc::new(settings),
            storage,
            guard,
        }
    }
}

/// Open the storage adapter selected in `settings`
pub async fn open_storage(settings: &Settings) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match settings.storage.backend {
        StorageBackend::FlatFile => {
            info!(data_dir = %settings.data_dir.display(), "using flat-file storage");
            Arc::new(FlatFileStorage::new(&settings.data_dir)?)
        },
        StorageBackend::Postgres => {
            let url = settings.storage.database_url.as_deref().unwrap_or_default();
            let pg = PgStorage::connect(url, settings.storage.max_connections).await?;
            info!("using postgres storage");
            Arc::new(pg)
        },
        StorageBackend::Disabled => {
            warn!("storage disabled, persistence endpoints will answer 503");
            Arc::new(UnavailableStorage)
        },
    };
    Ok(storage)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origin = match settings.cors_origin_list() {
        Some(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the full application: `/ws` plus the `/api` surface
pub fn app(state: AppState) -> Router {
    let settings = state.settings.clone();
    Router::new()
        .merge(ws_router::create_router())
        // health is also served outside /api
        .route("/health", get(handlers::health::health))
        .nest("/api", handlers::api_router(&settings))
        .layer(cors_layer(&settings))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
