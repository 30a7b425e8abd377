//! HTTP + WebSocket transport surface (`spec.md` §4.7 "Serve plain",
//! "Serve entry"), built the way the teacher crate's `transport::build_router`
//! assembles its router: one `Router` over a single shared state, CORS
//! permissive, health check unauthenticated.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::manager::RemoteManager;

/// Builds the router: `/ws/peer` for inbound process-to-process
/// connections, a catch-all fallback for entry connections (resolved by
/// `RemoteManager::resolve_entry_key` against the request path/query), and
/// `/health`.
pub fn build_router(manager: Arc<RemoteManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/peer", get(peer_ws_handler))
        .fallback(crate::entry::entry_ws_handler)
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// `GET /ws/peer` — upgrade an inbound peer connection and serve it to
/// completion via [`RemoteManager::run_inbound_peer_socket`]. The peer's own
/// address is unknown at the protocol level (nodes authenticate by key, not
/// by connection identity), so each inbound socket gets a process-unique
/// label rather than the outbound side's URL.
async fn peer_ws_handler(
    State(manager): State<Arc<RemoteManager>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let peer_id = format!("inbound:{}", uuid_like());
        manager.run_inbound_peer_socket(socket, peer_id).await;
    })
}

/// A process-unique label for an inbound peer connection, good enough to key
/// the manager's peer table for the life of the socket. Not a real UUID —
/// this crate has no occasion to parse or compare these across restarts.
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}
