//! relay-server — WebSocket/HTTP front-end binding the room core to real
//! sockets. §12.

pub mod metadata;
pub mod registry;
pub mod ws;

use std::sync::Arc;

use crate::metadata::RoomMetadataSource;
use crate::registry::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub metadata: Arc<dyn RoomMetadataSource>,
}

pub fn router(state: AppState) -> axum::Router {
    use axum::routing::get;
    axum::Router::new()
        .route("/healthz", get(ws::healthz))
        .route("/rooms/{slug}/speaker", get(ws::speaker_ws))
        .route("/rooms/{slug}/listen", get(ws::listener_ws))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
