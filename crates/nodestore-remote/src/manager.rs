//! Process-singleton connection manager (`spec.md` §4.7 "RemoteManager";
//! `original_source/redux/medium/remote.py`).
//!
//! A real process singleton is avoided in favor of an explicit
//! `Arc<RemoteManager>` held by the binary's `run()` and threaded through
//! medium constructors — the same observable behavior without a hidden
//! global, matching how the teacher crate threads `Arc<MuxState>` rather
//! than reaching for a `static`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket as AxumWebSocket};
use futures_util::{SinkExt, StreamExt};
use nodestore_core::{Action, Store};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::{RemoteError, RemoteResult};
use crate::remote_medium::RemoteMedium;
use crate::wire::{self, PeerFrame};

type PeerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A registered `PublicEntryReducer` route: the class to dispatch into, and
/// the function that resolves a node id from the request URL.
pub struct EntryRouteDef {
    pub class: &'static nodestore_core::ClassDef,
    pub find_node_id: fn(prefix: &str, path: &str, query: &str) -> Option<String>,
}

struct PeerConnection {
    out: mpsc::UnboundedSender<PeerFrame>,
}

/// Correlates an outstanding PICK with the future its requester is awaiting.
/// Keyed by the requester's own key: a given node has at most one in-flight
/// pick per connection at a time, matching `remote.py`'s `state_pick_dict`
/// (a second concurrent pick from the same key displaces the first).
type StatePickMap = HashMap<String, oneshot::Sender<Option<HashMap<String, Value>>>>;

pub struct RemoteManager {
    self_ref: Weak<RemoteManager>,
    store: Arc<Store>,
    peers: RwLock<HashMap<String, Arc<PeerConnection>>>,
    client_allow_set: RwLock<HashSet<String>>,
    state_pick_dict: Mutex<StatePickMap>,
    entry_routes: RwLock<Vec<EntryRouteDef>>,
    entry_bindings: RwLock<HashSet<String>>,
    reconnect_timeout: Duration,
    pick_deadline: Duration,
}

impl RemoteManager {
    pub fn new(store: Arc<Store>, reconnect_timeout: Duration, pick_deadline: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak| RemoteManager {
            self_ref: weak.clone(),
            store,
            peers: RwLock::new(HashMap::new()),
            client_allow_set: RwLock::new(HashSet::new()),
            state_pick_dict: Mutex::new(HashMap::new()),
            entry_routes: RwLock::new(Vec::new()),
            entry_bindings: RwLock::new(HashSet::new()),
            reconnect_timeout,
            pick_deadline,
        })
    }

    // A `RemoteManager` only ever hands out `&self` while it is alive, so the
    // `self_ref` weak handle can only fail to upgrade during the manager's
    // own drop, which cannot race with a call already holding `&self`.
    #[allow(clippy::expect_used)]
    fn arc(&self) -> Arc<RemoteManager> {
        self.self_ref.upgrade().expect("manager dropped while a medium was still using it")
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// A `RemoteMedium` addressing peers through this manager's named peer
    /// connection, for attaching to actions reconstructed off the wire and
    /// for handing to reducer hooks that want to talk back to a peer.
    pub fn medium_for_peer(&self, peer_id: impl Into<String>) -> Arc<RemoteMedium> {
        Arc::new(RemoteMedium::new(self.arc(), peer_id.into()))
    }

    pub async fn register_entry_route(&self, route: EntryRouteDef) {
        self.entry_routes.write().await.push(route);
    }

    /// Resolves the first registered entry route whose `find_node_id`
    /// yields a node id for this path/query, the way `on_new_entry` tries
    /// each registered class in turn.
    pub async fn resolve_entry_key(&self, path: &str, query: &str) -> Option<String> {
        let routes = self.entry_routes.read().await;
        for route in routes.iter() {
            if let Some(node_id) = (route.find_node_id)(route.class.key_prefix, path, query) {
                return Some(format!("{}{}", route.class.key_prefix, node_id));
            }
        }
        None
    }

    /// "First binder wins": returns `true` if this key was not already
    /// bound to an entry socket and is now claimed by this caller.
    pub async fn try_bind_entry(&self, key: &str) -> bool {
        self.entry_bindings.write().await.insert(key.to_string())
    }

    pub async fn release_entry(&self, key: &str) {
        self.entry_bindings.write().await.remove(key);
    }

    /// Adds `url` to the set of addresses the manager maintains an
    /// outbound client connection to, and spawns the reconnect loop.
    pub fn spawn_client(self: &Arc<Self>, url: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.client_allow_set.write().await.insert(url.clone());
            manager.client_loop(url).await;
        });
    }

    /// Removes `url` from the allow-set; the reconnect loop observes this
    /// on its next iteration and stops.
    pub async fn disallow_client(&self, url: &str) {
        self.client_allow_set.write().await.remove(url);
    }

    /// Mirrors `client_to_offline`: races a fixed sleep against a connect
    /// attempt, looping until either a connection is established or the URL
    /// is removed from the allow-set. `tokio::select!` drops the losing
    /// branch, so the loser needs no explicit cancellation.
    async fn client_loop(self: Arc<Self>, url: String) {
        loop {
            if !self.client_allow_set.read().await.contains(&url) {
                return;
            }

            let connected = tokio::select! {
                _ = tokio::time::sleep(self.reconnect_timeout) => None,
                result = tokio_tungstenite::connect_async(&url) => result.ok(),
            };

            let Some((socket, _)) = connected else {
                continue;
            };

            tracing::info!(url = %url, "peer client connected");
            self.clone().run_peer_socket(socket, url.clone()).await;
            tracing::info!(url = %url, "peer client disconnected, will retry");
        }
    }

    /// Serves one peer WebSocket connection (inbound or outbound) to
    /// completion: reads frames, routes ACTION into the store, answers PICK
    /// with PICKACK, resolves matching PICKACK futures. Closes on an
    /// unrecognized `__t__`, per `spec.md` §6 (the source tolerates and
    /// silently drops unknown frames; the spec overrides that).
    pub async fn run_peer_socket(self: Arc<Self>, socket: PeerSocket, peer_id: String) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<PeerFrame>();
        self.peers.write().await.insert(peer_id.clone(), Arc::new(PeerConnection { out: tx }));

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match rmp_serde::to_vec_named(&frame) {
                    Ok(bytes) => {
                        if ws_tx.send(WsMessage::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to encode peer frame"),
                }
            }
        });

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(_) => break,
            };
            let bytes = match msg {
                WsMessage::Binary(b) => b,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            match rmp_serde::from_slice::<PeerFrame>(&bytes) {
                Ok(frame) => {
                    if self.handle_peer_frame(&peer_id, frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(peer = %peer_id, error = %err, "unrecognized peer frame, closing");
                    break;
                }
            }
        }

        self.peers.write().await.remove(&peer_id);
        writer.abort();
    }

    /// Serves one *inbound* peer WebSocket accepted by axum — the listening
    /// side of `on_new_connection`. Same frame loop as [`run_peer_socket`],
    /// ported to axum's `WebSocket`/`Message` types rather than
    /// tokio-tungstenite's, since an axum-upgraded socket never is one.
    pub async fn run_inbound_peer_socket(self: Arc<Self>, socket: AxumWebSocket, peer_id: String) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<PeerFrame>();
        self.peers.write().await.insert(peer_id.clone(), Arc::new(PeerConnection { out: tx }));

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match rmp_serde::to_vec_named(&frame) {
                    Ok(bytes) => {
                        if ws_tx.send(AxumMessage::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to encode peer frame"),
                }
            }
        });

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(_) => break,
            };
            let bytes = match msg {
                AxumMessage::Binary(b) => b,
                AxumMessage::Close(_) => break,
                _ => continue,
            };
            match rmp_serde::from_slice::<PeerFrame>(&bytes) {
                Ok(frame) => {
                    if self.handle_peer_frame(&peer_id, frame).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(peer = %peer_id, error = %err, "unrecognized peer frame, closing");
                    break;
                }
            }
        }

        self.peers.write().await.remove(&peer_id);
        writer.abort();
    }

    async fn handle_peer_frame(&self, peer_id: &str, frame: PeerFrame) -> RemoteResult<()> {
        match &frame {
            PeerFrame::Action { .. } => {
                if let Some((target_key, action)) = wire::from_message(frame) {
                    let action = action.with_medium(self.medium_for_peer(peer_id));
                    self.store.dispatch(&target_key, action).await;
                }
            }
            PeerFrame::Pick { .. } => {
                if let Some((target_key, requester_key, fields)) = wire::from_pick_message(&frame) {
                    let state = self.store.get(&target_key).await;
                    let projected = state
                        .map(|s| wire::state_filter(&s, fields.as_deref()));
                    let ack = wire::to_pick_ack_message(&target_key, &requester_key, projected);
                    self.send_frame(peer_id, ack).await;
                }
            }
            PeerFrame::PickAck { .. } => {
                if let Some((_target_key, requester_key, state)) = wire::from_pick_ack_message(&frame) {
                    if let Some(sender) = self.state_pick_dict.lock().await.remove(&requester_key) {
                        let _ = sender.send(state);
                    }
                }
            }
            // Accepted but inert, per the unimplemented-frame-types open question.
            PeerFrame::Subscribe { .. } | PeerFrame::Unsubscribe { .. } | PeerFrame::State { .. } => {}
        }
        Ok(())
    }

    async fn send_frame(&self, peer_id: &str, frame: PeerFrame) {
        if let Some(conn) = self.peers.read().await.get(peer_id) {
            let _ = conn.out.send(frame);
        }
    }

    /// Sends an ACTION frame to `target_key` over the named peer
    /// connection.
    pub async fn send_action(
        &self,
        peer_id: &str,
        self_key: &str,
        target_key: &str,
        action: Action,
    ) -> RemoteResult<()> {
        let frame = wire::to_message(self_key, target_key, &action);
        match self.peers.read().await.get(peer_id) {
            Some(conn) => conn.out.send(frame).map_err(|_| RemoteError::ConnectionClosed),
            None => Err(RemoteError::ConnectionClosed),
        }
    }

    /// Requests a state snapshot of `target_key` from the peer, waiting up
    /// to `pick_deadline` for the PICKACK.
    pub async fn pick_state(
        &self,
        peer_id: &str,
        self_key: &str,
        target_key: &str,
        fields: Option<&[String]>,
    ) -> RemoteResult<Option<HashMap<String, Value>>> {
        let (tx, rx) = oneshot::channel();
        self.state_pick_dict.lock().await.insert(self_key.to_string(), tx);

        let frame = wire::to_pick_message(self_key, target_key, fields);
        {
            let peers = self.peers.read().await;
            let conn = peers.get(peer_id).ok_or(RemoteError::ConnectionClosed)?;
            conn.out.send(frame).map_err(|_| RemoteError::ConnectionClosed)?;
        }

        match tokio::time::timeout(self.pick_deadline, rx).await {
            Ok(Ok(state)) => Ok(state),
            _ => {
                self.state_pick_dict.lock().await.remove(self_key);
                Err(RemoteError::Timeout)
            }
        }
    }

    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }
}

/// Run with a shutdown token so graceful shutdown can stop spawned loops.
pub async fn run_until_cancelled(shutdown: CancellationToken) {
    shutdown.cancelled().await;
}
