//! The entry medium and the "serve entry" connection lifecycle
//! (`spec.md` §4.5 "Entry medium", §4.7 "Serve entry";
//! `original_source/redux/medium/remote.py`'s `EntryMedium`/`EntryListener`/
//! `on_new_entry`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{OriginalUri, RawQuery, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use nodestore_core::error::{CoreError, CoreResult};
use nodestore_core::listener::{Listener, Subscription};
use nodestore_core::medium::{Medium, MediumKind};
use nodestore_core::{Action, Store};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::manager::RemoteManager;
use crate::wire;

/// An external client connection bound one-to-one to a `PublicEntryReducer`
/// key. `send` ignores `target_key` and always writes to the bound socket —
/// the same shape as the source's `EntryMedium.send`, which never consults
/// its `key` argument either.
#[derive(Clone)]
pub struct EntryMedium {
    outbound: mpsc::UnboundedSender<Value>,
}

impl EntryMedium {
    fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        EntryMedium { outbound }
    }
}

#[async_trait]
impl Medium for EntryMedium {
    fn kind(&self) -> MediumKind {
        MediumKind::Entry
    }

    async fn send(&self, _self_key: &str, _target_key: &str, action: Action) -> CoreResult<()> {
        let frame = wire::entry_json_from_action(&action);
        self.outbound.send(frame).map_err(|_| CoreError::Medium("entry socket closed".to_string()))
    }

    /// Not overridden by the source's `EntryMedium` either — an entry
    /// socket is a destination, not something a reducer reads state back
    /// out of.
    async fn get_state(
        &self,
        _self_key: &str,
        _target_key: &str,
        _fields: Option<&[String]>,
    ) -> CoreResult<Option<HashMap<String, Value>>> {
        Err(CoreError::Medium("entry medium does not support get_state".to_string()))
    }

    async fn subscribe(
        &self,
        _self_key: &str,
        _target_key: &str,
        _listener: Arc<dyn Listener>,
    ) -> CoreResult<Option<Subscription>> {
        Err(CoreError::Medium("entry medium does not support subscribe".to_string()))
    }

    async fn unsubscribe(&self, _self_key: &str, _subscription: &Subscription) -> CoreResult<()> {
        Ok(())
    }
}

/// The synthetic listener `on_new_entry` registers against the bound key so
/// that state changes flush to the socket and the node is pulled off the
/// idle index for as long as the connection lives. Flushes a `__STATE__`
/// frame carrying the full changed-and-filtered state — more than the
/// source's stub `on_changed` (which serializes `{}`), since `spec.md`
/// §4.7 asks for state changes to actually reach the socket.
struct EntryStateListener {
    outbound: mpsc::UnboundedSender<Value>,
}

#[async_trait]
impl Listener for EntryStateListener {
    async fn on_changed(&self, _changed: &[String], state: &HashMap<String, Value>) {
        let mut obj = serde_json::Map::new();
        obj.insert("type".to_string(), Value::from("__STATE__"));
        obj.insert("state".to_string(), Value::Object(state.iter().map(|(k, v)| (k.clone(), v.clone())).collect()));
        let _ = self.outbound.send(Value::Object(obj));
    }
}

/// `GET /{*path}` (mounted as the router's fallback) — resolves the request
/// path/query against every registered `PublicEntryReducer` route via
/// `find_node_id`, matching `on_new_entry`'s "try each registered class in
/// turn". A path that resolves to no node closes the connection
/// immediately per `spec.md` §6.
pub async fn entry_ws_handler(
    State(manager): State<Arc<RemoteManager>>,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    let query = query.unwrap_or_default();
    match manager.resolve_entry_key(&path, &query).await {
        Some(key) => ws.on_upgrade(move |socket| serve_entry_connection(manager, key, socket)).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serves one entry connection to completion, mirroring `on_new_entry`:
/// bind the socket to `key` (first binder wins), subscribe the synthetic
/// state listener, install the `EntryMedium` into the reducer, then loop
/// reading inbound JSON action frames until the socket closes.
async fn serve_entry_connection(manager: Arc<RemoteManager>, key: String, socket: WebSocket) {
    if !manager.try_bind_entry(&key).await {
        tracing::debug!(key = %key, "entry key already bound, rejecting connection");
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();

    let listener: Arc<dyn Listener> = Arc::new(EntryStateListener { outbound: outbound_tx.clone() });
    let subscription = match manager.store().subscribe(&key, Arc::clone(&listener)).await {
        Ok(Some(sub)) => sub,
        _ => {
            manager.release_entry(&key).await;
            return;
        }
    };

    let entry_medium: Arc<dyn Medium> = Arc::new(EntryMedium::new(outbound_tx));
    manager.store().set_entry_medium(&key, Some(Arc::clone(&entry_medium))).await;

    let writer = tokio::spawn(async move {
        while let Some(value) = outbound_rx.recv().await {
            let text = value.to_string();
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "discarding unparseable entry frame");
                continue;
            }
        };
        if let Some(action) = wire::entry_action_from_json(value) {
            let action = action.with_medium(Arc::clone(&entry_medium));
            let store = Arc::clone(manager.store());
            let key = key.clone();
            tokio::spawn(async move {
                store.dispatch(&key, action).await;
            });
        }
    }

    writer.abort();
    manager.store().unsubscribe(&subscription).await;
    manager.store().set_entry_medium(&key, None).await;
    manager.release_entry(&key).await;
}
