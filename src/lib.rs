pub mod appresult;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod hub;
pub mod messages;
pub mod protocol;
pub mod rooms;
pub mod server;
pub mod ws;

use std::sync::Arc;

use axum::{Json, Router, debug_handler, extract::{FromRef, State}, response::IntoResponse, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult, Data};

use auth::{AuthProvider, RegisteredUserAuth};
use db::Store;
use hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub hub: Arc<Hub>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// State wired with the default identity provider.
    pub fn new(store: Store) -> Self {
        Self {
            auth: Arc::new(RegisteredUserAuth::new(store.clone())),
            hub: Arc::new(Hub::new()),
            store,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }
}

pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::live))
        .merge(rooms::router())
        .merge(messages::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[debug_handler(state = AppState)]
async fn health(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": hub.connection_count().await,
        "rooms": hub.room_count().await,
    }))
}
