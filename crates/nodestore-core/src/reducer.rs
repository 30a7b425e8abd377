//! The stateful, addressable node type (`spec.md` §3 "Reducer instance",
//! §4.3 "Reduce step").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use std::time::Duration;

use crate::action::Action;
use crate::combine::Barrier;
use crate::error::CoreError;
use crate::listener::Listener;
use crate::medium::Medium;

/// Reserved state-slot marker. A single leading underscore, distinct from
/// the double-underscore convention used for action arguments — see
/// `action::is_reserved_argument` and the design note this mirrors.
pub fn is_reserved_slot(name: &str) -> bool {
    name.starts_with('_')
}

type SlotFuture = Pin<Box<dyn Future<Output = Value> + Send>>;

/// A pure-ish per-slot reducer function: `(action, prior value) -> new
/// value`. Boxed as a trait object so a concrete `Reducer` impl can build
/// its `mapping` from plain async closures, the way the source's reducer
/// classes declare one async method per slot.
#[derive(Clone)]
pub struct SlotFn(Arc<dyn Fn(Action, Option<Value>) -> SlotFuture + Send + Sync>);

impl SlotFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Action, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        SlotFn(Arc::new(move |action, prior| Box::pin(f(action, prior))))
    }

    pub async fn call(&self, action: Action, prior: Option<Value>) -> Value {
        (self.0)(action, prior).await
    }
}

impl std::fmt::Debug for SlotFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SlotFn(..)")
    }
}

/// A stateful node hosted by the store under a unique key.
///
/// Default hook implementations are no-ops, which is the Rust rendition of
/// the source's "only call this hook if the subclass overrode it" runtime
/// check — since an unoverridden default is already free, there is nothing
/// left to detect.
#[async_trait]
pub trait Reducer: Send + Sync {
    /// This node's slot-reducer mapping and its mutable state, borrowed
    /// simultaneously. Implementors store both as plain fields and return
    /// `(&self.mapping, &mut self.state)` — a disjoint split borrow.
    fn mapping_and_state(&mut self) -> (&IndexMap<String, SlotFn>, &mut HashMap<String, Value>);

    /// Read-only view of current state, for callers that only need
    /// `get_state`/`reduce_finish`-style access.
    fn state(&self) -> &HashMap<String, Value>;

    /// Called once, immediately after construction, with the node's key.
    /// A `false` or `Err` result discards the newly constructed node before
    /// it ever becomes visible in the store.
    async fn initialize(&mut self, _key: &str, _ctx: &NodeContext) -> Result<bool, CoreError> {
        Ok(true)
    }

    /// Called first under the instance lock, before slot reducers run. The
    /// usual place to emit follow-on actions through a medium, or to
    /// install a combine/any barrier via `ctx`.
    async fn action_received(&mut self, _action: &Action, _ctx: &NodeContext) {}

    /// Called after slot reducers run and the new state is committed, with
    /// the non-reserved slots that changed identity this dispatch.
    async fn reduce_finish(
        &mut self,
        _action: &Action,
        _changed: &HashMap<String, Value>,
        _ctx: &NodeContext,
    ) {
    }

    /// Called once, under the instance lock, at retirement.
    async fn shutdown(&mut self, _ctx: &NodeContext) {}

    /// Invoked when `action.type()` is in the class's
    /// `subscribe_action_set`. Returning a listener registers it against
    /// this node's own key.
    async fn enable_subscribe(
        &mut self,
        _action: &Action,
        _ctx: &NodeContext,
    ) -> Option<Arc<dyn Listener>> {
        None
    }

    /// Invoked when `action.type()` is in the class's
    /// `unsubscribe_action_set`. Returning a listener unregisters it.
    async fn enable_unsubscribe(
        &mut self,
        _action: &Action,
        _ctx: &NodeContext,
    ) -> Option<Arc<dyn Listener>> {
        None
    }

    /// Installs (or, with `None`, clears) the medium this node's hooks can
    /// use to reply to its bound external connection. Only meaningful for
    /// `PublicEntryReducer`-style nodes (`spec.md` §4.7's "install an
    /// `EntryMedium` into the reducer as `entry_medium`"); the base
    /// `Reducer` default is a no-op so ordinary nodes can ignore it.
    async fn bind_entry_medium(&mut self, _medium: Option<Arc<dyn Medium>>) {}
}

/// Dispatch-back capability handed to a node's hooks via [`NodeContext`],
/// implemented by `Store` itself. Kept as a trait object so `reducer.rs`
/// never needs to name `Store` and the two modules don't form a cycle.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Re-enter the dispatch pipeline for this same node's key — used by
    /// barrier timeout/finish driving and by hooks that want to fire a
    /// follow-on action at themselves.
    async fn dispatch_self(&self, key: &str, action: Action) -> bool;

    /// Install a barrier against `key`'s node and schedule the race between
    /// the gate consuming it and `timeout` elapsing. Fire-and-forget: the
    /// losing side of the race is a no-op, per the single-completion rule.
    async fn install_barrier(&self, key: &str, barrier: Barrier, timeout: Duration);
}

/// Handed to every `Reducer` hook call; the node's view onto the store it
/// lives in, scoped to its own key.
#[derive(Clone)]
pub struct NodeContext {
    dispatcher: Arc<dyn Dispatcher>,
    key: String,
}

impl NodeContext {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, key: String) -> Self {
        NodeContext { dispatcher, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `combine(types, combine_action, timeout_action, timeout,
    /// keep_origin)` — install a barrier that completes once every listed
    /// type has been observed.
    pub async fn combine_message(
        &self,
        types: impl IntoIterator<Item = String>,
        combine_action: Action,
        timeout_action: Action,
        timeout: Duration,
        keep_origin: bool,
    ) {
        let barrier = Barrier::combine(types, combine_action, timeout_action.clone(), keep_origin);
        self.dispatcher.install_barrier(&self.key, barrier, timeout).await;
    }

    /// `any(types, timeout_action, timeout)` — install a barrier that
    /// completes on the first observed match.
    pub async fn any_message(
        &self,
        types: impl IntoIterator<Item = String>,
        timeout_action: Action,
        timeout: Duration,
    ) {
        let barrier = Barrier::any(types, timeout_action);
        self.dispatcher.install_barrier(&self.key, barrier, timeout).await;
    }
}

/// Public state snapshot with reserved slots filtered out, the shape handed
/// to `Store::get`, listener notifications, and outbound entry JSON.
pub fn public_state(state: &HashMap<String, Value>) -> HashMap<String, Value> {
    state.iter().filter(|(k, _)| !is_reserved_slot(k)).map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slot_fn_receives_prior_value_and_action() {
        let slot = SlotFn::new(|action, prior| async move {
            let base = prior.and_then(|v| v.as_i64()).unwrap_or(0);
            let delta = action.argument("change").and_then(|v| v.as_i64()).unwrap_or(0);
            Value::from(base + delta)
        });
        let mut args = HashMap::new();
        args.insert("change".to_string(), Value::from(5));
        let action = Action::with_arguments("INCREASE", args);
        let result = slot.call(action, Some(Value::from(10))).await;
        assert_eq!(result, Value::from(15));
    }

    #[test]
    fn reserved_slot_uses_single_underscore() {
        assert!(is_reserved_slot("_internal"));
        assert!(is_reserved_slot("__internal"));
        assert!(!is_reserved_slot("equity"));
    }

    #[test]
    fn public_state_filters_reserved_slots() {
        let mut state = HashMap::new();
        state.insert("equity".to_string(), Value::from(1));
        state.insert("_cursor".to_string(), Value::from(2));
        let pub_state = public_state(&state);
        assert_eq!(pub_state.len(), 1);
        assert!(pub_state.contains_key("equity"));
    }
}
