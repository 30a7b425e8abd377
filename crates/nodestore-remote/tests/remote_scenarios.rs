//! Integration tests for the two transport scenarios that need a real
//! socket round trip (`spec.md` §8 scenarios 4 and 6): entry routing and
//! remote state pick. Both bind a real loopback listener rather than using
//! `axum-test`'s in-process `TestServer`, since neither scenario is
//! expressible over a plain HTTP request/response.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use indexmap::IndexMap;
use nodestore_core::reducer::SlotFn;
use nodestore_core::{Action, ClassDef, RecycleOption, Store};
use nodestore_remote::manager::EntryRouteDef;
use nodestore_remote::RemoteManager;
use nodestore_shims::GeneralReducer;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

static GREETER_CLASS: ClassDef = ClassDef {
    key_prefix: "greet:",
    recycle: RecycleOption::Never,
    subscribe_action_set: &[],
    unsubscribe_action_set: &[],
    factory: spawn_greeter,
};

fn spawn_greeter() -> Box<dyn nodestore_core::Reducer> {
    let mut mapping = IndexMap::new();
    mapping.insert(
        "hello".to_string(),
        SlotFn::new(|_action, _prior| async move { Value::from("hi") }),
    );
    Box::new(GeneralReducer::new(mapping))
}

static COUNTER_CLASS: ClassDef = ClassDef {
    key_prefix: "counter:",
    recycle: RecycleOption::Never,
    subscribe_action_set: &[],
    unsubscribe_action_set: &[],
    factory: spawn_counter,
};

fn spawn_counter() -> Box<dyn nodestore_core::Reducer> {
    let mut mapping = IndexMap::new();
    mapping.insert(
        "value".to_string(),
        SlotFn::new(|action, prior| async move {
            let base = prior.and_then(|v| v.as_i64()).unwrap_or(0);
            let delta = action.argument("delta").and_then(|v| v.as_i64()).unwrap_or(0);
            Value::from(base + delta)
        }),
    );
    Box::new(GeneralReducer::new(mapping))
}

async fn bind_server(manager: Arc<RemoteManager>) -> String {
    let router = nodestore_remote::http::build_router(manager);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("127.0.0.1:{}", addr.port())
}

#[tokio::test]
async fn entry_socket_receives_initial_state_on_connect() {
    let store = Store::new(nodestore_core::config::StoreConfig::default());
    store.register_class(&GREETER_CLASS).await.expect("register");

    let manager = RemoteManager::new(Arc::clone(&store), Duration::from_millis(100), Duration::from_millis(100));
    manager
        .register_entry_route(EntryRouteDef {
            class: &GREETER_CLASS,
            find_node_id: |_prefix, path, _query| path.strip_prefix("/greet/").map(|s| s.to_string()),
        })
        .await;

    let addr = bind_server(Arc::clone(&manager)).await;
    let url = format!("ws://{addr}/greet/abc");

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for initial state")
        .expect("stream ended")
        .expect("frame error");

    let text = match msg {
        WsMessage::Text(t) => t,
        other => panic!("expected a text frame, got {other:?}"),
    };
    let value: Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(value["type"], Value::from("__STATE__"));
    assert_eq!(value["state"]["hello"], Value::from("hi"));
}

#[tokio::test]
async fn remote_pick_returns_target_state() {
    let store = Store::new(nodestore_core::config::StoreConfig::default());
    store.register_class(&COUNTER_CLASS).await.expect("register");

    let mut args = std::collections::HashMap::new();
    args.insert("delta".to_string(), Value::from(42));
    store.dispatch("counter:1", Action::with_arguments("INCREMENT", args)).await;
    assert_eq!(store.get("counter:1").await.and_then(|s| s.get("value").cloned()), Some(Value::from(42)));

    let manager = RemoteManager::new(Arc::clone(&store), Duration::from_millis(100), Duration::from_millis(500));
    let addr = bind_server(Arc::clone(&manager)).await;
    let url = format!("ws://{addr}/ws/peer");

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");

    let pick = nodestore_remote::wire::to_pick_message("test:requester", "counter:1", None);
    let bytes = rmp_serde::to_vec_named(&pick).expect("encode");
    ws.send(WsMessage::Binary(bytes.into())).await.expect("send pick");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for pickack")
        .expect("stream ended")
        .expect("frame error");

    let bytes = match msg {
        WsMessage::Binary(b) => b,
        other => panic!("expected a binary frame, got {other:?}"),
    };
    let frame: nodestore_remote::wire::PeerFrame = rmp_serde::from_slice(&bytes).expect("decode");
    let (target, requester, state) = nodestore_remote::wire::from_pick_ack_message(&frame).expect("pickack frame");
    assert_eq!(target, "counter:1");
    assert_eq!(requester, "test:requester");
    assert_eq!(state.expect("state present").get("value"), Some(&Value::from(42)));
}
