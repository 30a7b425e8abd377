//! The process-wide registry, dispatcher and subscription manager
//! (`spec.md` §4.1–§4.4).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::action::Action;
use crate::combine::Barrier;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::listener::{listener_id, Listener, ListenerId, Subscription};
use crate::recycle::RecycleOption;
use crate::reducer::{public_state, Dispatcher, NodeContext, Reducer};

/// Class registration metadata (`spec.md` §6 "Class registration
/// metadata"). Reducer classes are expected to expose a `const`/`static`
/// `ClassDef` (the Rust rendition of the source's `@redux.behavior(...)`
/// decorator, applied to data instead of to a decorator call).
pub struct ClassDef {
    pub key_prefix: &'static str,
    pub recycle: RecycleOption,
    pub subscribe_action_set: &'static [&'static str],
    pub unsubscribe_action_set: &'static [&'static str],
    pub factory: fn() -> Box<dyn Reducer>,
}

impl std::fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDef").field("key_prefix", &self.key_prefix).finish()
    }
}

struct Node {
    key: String,
    node_id: String,
    class: &'static ClassDef,
    reducer: AsyncMutex<Box<dyn Reducer>>,
    barriers: AsyncMutex<Vec<Barrier>>,
    is_new: AtomicBool,
}

/// One outgoing subscription a node holds against another node (possibly
/// through a remote medium), tracked so `retire` can release it — the Rust
/// rendition of the source's per-instance `subscribe_set`/`listener_dict`
/// bookkeeping (`spec.md` §3, §4.7.3).
struct OutgoingSubscription {
    medium: Arc<dyn crate::medium::Medium>,
    subscription: Subscription,
}

/// A live node handle, returned by read-oriented store operations.
#[derive(Clone)]
pub struct NodeRef(Arc<Node>);

impl NodeRef {
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn node_id(&self) -> &str {
        &self.0.node_id
    }

    /// Public (reserved-slot-filtered) state snapshot.
    pub async fn state(&self) -> HashMap<String, Value> {
        let guard = self.0.reducer.lock().await;
        public_state(guard.state())
    }
}

/// The process-local registry: reducer-class catalog, live node map,
/// per-key subscriber list, idle-expiry priority queue, dispatch pipeline.
pub struct Store {
    self_ref: Weak<Store>,
    config: StoreConfig,
    classes: RwLock<Vec<&'static ClassDef>>,
    nodes: RwLock<HashMap<String, Arc<Node>>>,
    observers: RwLock<HashMap<String, IndexMap<ListenerId, Arc<dyn Listener>>>>,
    idle_index: AsyncMutex<BTreeSet<(Instant, String)>>,
    idle_scheduled: AsyncMutex<HashMap<String, Instant>>,
    init_lock: AsyncMutex<()>,
    outgoing_subscriptions: AsyncMutex<HashMap<String, Vec<OutgoingSubscription>>>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Store {
            self_ref: weak.clone(),
            config,
            classes: RwLock::new(Vec::new()),
            nodes: RwLock::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
            idle_index: AsyncMutex::new(BTreeSet::new()),
            idle_scheduled: AsyncMutex::new(HashMap::new()),
            init_lock: AsyncMutex::new(()),
            outgoing_subscriptions: AsyncMutex::new(HashMap::new()),
        })
    }

    // A `Store` only ever hands out `&self` while it is alive, so the
    // `self_ref` weak handle can only fail to upgrade during the store's own
    // drop, which cannot race with a call already holding `&self`.
    #[allow(clippy::expect_used)]
    fn arc(&self) -> Arc<Store> {
        self.self_ref.upgrade().expect("store dropped while a node was still using it")
    }

    fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.arc()
    }

    /// Starts the idle sweeper. A library should not spawn background work
    /// behind a caller's back, so this is opt-in and idempotent in effect
    /// only if called once — calling it twice runs two sweepers.
    pub fn spawn_cleaner(&self) -> JoinHandle<()> {
        let store = self.arc();
        let period = self.config.cleaner_period();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                store.sweep_idle().await;
            }
        })
    }

    /// Mutate the class catalog. Rejects a prefix that is a string-prefix
    /// of, or has as a string-prefix, any already-registered prefix — the
    /// ambiguity the source tolerates and this design explicitly rejects.
    pub async fn register_class(&self, class: &'static ClassDef) -> CoreResult<()> {
        let mut classes = self.classes.write().await;
        for existing in classes.iter() {
            if existing.key_prefix.starts_with(class.key_prefix)
                || class.key_prefix.starts_with(existing.key_prefix)
            {
                return Err(CoreError::Key(format!(
                    "prefix `{}` overlaps already-registered prefix `{}`",
                    class.key_prefix, existing.key_prefix
                )));
            }
        }
        classes.push(class);
        Ok(())
    }

    pub async fn unregister_class(&self, class: &'static ClassDef) {
        let mut classes = self.classes.write().await;
        classes.retain(|c| !std::ptr::eq(*c, class));
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.nodes.read().await.contains_key(key)
    }

    /// Read-only snapshot of a live node's public state.
    pub async fn get(&self, key: &str) -> Option<HashMap<String, Value>> {
        let node = self.nodes.read().await.get(key).cloned()?;
        let guard = node.reducer.lock().await;
        Some(public_state(guard.state()))
    }

    pub async fn find_class_by_prefix(&self, key: &str) -> Option<&'static ClassDef> {
        let classes = self.classes.read().await;
        classes.iter().find(|c| key.starts_with(c.key_prefix)).copied()
    }

    pub async fn find_nodes_by_class(&self, class: &'static ClassDef) -> Vec<NodeRef> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|n| std::ptr::eq(n.class, class))
            .map(|n| NodeRef(Arc::clone(n)))
            .collect()
    }

    /// Idempotent: returns the existing node, or constructs one if `class`
    /// is supplied and `initialize` succeeds. Construction is serialized by
    /// `init_lock` so two concurrent creators of the same key collapse to
    /// one instance.
    pub async fn get_or_create(
        &self,
        key: &str,
        class: Option<&'static ClassDef>,
    ) -> CoreResult<Option<NodeRef>> {
        if let Some(existing) = self.nodes.read().await.get(key) {
            return Ok(Some(NodeRef(Arc::clone(existing))));
        }
        let _guard = self.init_lock.lock().await;
        if let Some(existing) = self.nodes.read().await.get(key) {
            return Ok(Some(NodeRef(Arc::clone(existing))));
        }
        let class = match class {
            Some(c) => c,
            None => return Ok(None),
        };
        let node_id = key.strip_prefix(class.key_prefix).unwrap_or("").to_string();
        let mut reducer = (class.factory)();
        let ctx = NodeContext::new(self.dispatcher(), key.to_string());
        let ok = reducer
            .initialize(key, &ctx)
            .await
            .map_err(|e| CoreError::Reducer { key: key.to_string(), source: anyhow::anyhow!(e) })?;
        if !ok {
            return Ok(None);
        }
        let node = Arc::new(Node {
            key: key.to_string(),
            node_id,
            class,
            reducer: AsyncMutex::new(reducer),
            barriers: AsyncMutex::new(Vec::new()),
            is_new: AtomicBool::new(true),
        });
        self.nodes.write().await.insert(key.to_string(), Arc::clone(&node));
        Ok(Some(NodeRef(node)))
    }

    /// The dispatch pipeline (`spec.md` §4.2). Exceptions are caught at this
    /// boundary and reported as `false`; they never crash neighbors.
    pub async fn dispatch(&self, key: &str, action: Action) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.dispatch_inner(key, action).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(key, error = %err, "dispatch failed");
                false
            }
        }
    }

    async fn dispatch_inner(&self, key: &str, action: Action) -> CoreResult<bool> {
        let node = match self.nodes.read().await.get(key).cloned() {
            Some(n) => n,
            None => {
                if action.is_soft() {
                    return Ok(true);
                }
                let class = match self.find_class_by_prefix(key).await {
                    Some(c) => c,
                    None => return Ok(false),
                };
                match self.get_or_create(key, Some(class)).await? {
                    Some(node_ref) => node_ref.0,
                    None => return Ok(false),
                }
            }
        };

        if let Some(timeout) = node.class.recycle.idle_timeout() {
            if timeout > Duration::ZERO && !action.is_soft() {
                self.schedule_idle(key, timeout).await;
            }
        }

        let gate = self.combine_gate(&node, &action).await;
        let mut consumed = false;
        if let Some(observation) = gate {
            consumed = !observation.keep_origin;
            if let Some(completed_action) = observation.completed {
                self.spawn_self_dispatch(key, completed_action);
            }
        }

        if !consumed {
            let action_type = action.r#type();
            if node.class.subscribe_action_set.contains(&action_type) {
                let listener = {
                    let mut guard = node.reducer.lock().await;
                    let ctx = NodeContext::new(self.dispatcher(), key.to_string());
                    guard.enable_subscribe(&action, &ctx).await
                };
                if let Some(listener) = listener {
                    self.subscribe(key, listener).await?;
                }
            } else if node.class.unsubscribe_action_set.contains(&action_type) {
                let listener = {
                    let mut guard = node.reducer.lock().await;
                    let ctx = NodeContext::new(self.dispatcher(), key.to_string());
                    guard.enable_unsubscribe(&action, &ctx).await
                };
                if let Some(listener) = listener {
                    self.unsubscribe_by_identity(key, &listener).await;
                }
            } else {
                self.reduce(&node, &action).await?;
            }
        }

        let was_new = node.is_new.swap(false, Ordering::SeqCst);
        if was_new && node.class.recycle.is_ephemeral() {
            let has_observers =
                self.observers.read().await.get(key).map(|m| !m.is_empty()).unwrap_or(false);
            if !has_observers {
                self.retire(key).await;
            }
        }

        Ok(true)
    }

    /// Walk the node's barrier list for the first barrier tracking
    /// `action.type()`; feed it the observation and remove it if it just
    /// completed.
    async fn combine_gate(
        &self,
        node: &Arc<Node>,
        action: &Action,
    ) -> Option<crate::combine::BarrierObservation> {
        let mut barriers = node.barriers.lock().await;
        let mut matched_index = None;
        let mut observation = None;
        for (i, barrier) in barriers.iter_mut().enumerate() {
            if let Some(obs) = barrier.observe(action.r#type()) {
                matched_index = Some(i);
                observation = Some(obs);
                break;
            }
        }
        if let (Some(i), Some(obs)) = (matched_index, &observation) {
            if obs.barrier_done {
                barriers.remove(i);
            }
        }
        observation
    }

    fn spawn_self_dispatch(&self, key: &str, action: Action) {
        let store = self.arc();
        let key = key.to_string();
        tokio::spawn(async move {
            store.dispatch(&key, action).await;
        });
    }

    /// Reduce step (`spec.md` §4.3), run under the instance lock.
    async fn reduce(&self, node: &Arc<Node>, action: &Action) -> CoreResult<()> {
        let changed = {
            let mut guard = node.reducer.lock().await;
            let ctx = NodeContext::new(self.dispatcher(), node.key.clone());
            guard.action_received(action, &ctx).await;

            let (mapping, state) = guard.mapping_and_state();
            let mut changed = HashMap::new();
            for (slot, slot_fn) in mapping.iter() {
                if crate::reducer::is_reserved_slot(slot) {
                    continue;
                }
                let prior = state.get(slot).cloned();
                let next = slot_fn.call(action.clone(), prior.clone()).await;
                let identity_differs = match &prior {
                    Some(p) => p != &next,
                    None => true,
                };
                if identity_differs {
                    changed.insert(slot.clone(), next.clone());
                    state.insert(slot.clone(), next);
                }
            }
            guard.reduce_finish(action, &changed, &ctx).await;
            changed
        };

        if !changed.is_empty() {
            self.notify_listeners(&node.key, &changed).await;
        }
        Ok(())
    }

    async fn notify_listeners(&self, key: &str, changed: &HashMap<String, Value>) {
        let listeners: Vec<Arc<dyn Listener>> = {
            let observers = self.observers.read().await;
            match observers.get(key) {
                Some(map) => map.values().cloned().collect(),
                None => return,
            }
        };
        if listeners.is_empty() {
            return;
        }
        let state = self.get(key).await.unwrap_or_default();
        let changed_keys: Vec<String> = changed.keys().cloned().collect();
        for listener in &listeners {
            listener.on_changed(&changed_keys, &state).await;
        }
    }

    /// Subscription (`spec.md` §4.4).
    pub async fn subscribe(
        &self,
        key: &str,
        listener: Arc<dyn Listener>,
    ) -> CoreResult<Option<Subscription>> {
        let class =
            self.find_class_by_prefix(key).await.ok_or_else(|| CoreError::Key(key.to_string()))?;
        let id = listener_id(&listener);
        {
            let mut observers = self.observers.write().await;
            observers.entry(key.to_string()).or_insert_with(IndexMap::new).insert(id, Arc::clone(&listener));
        }

        let node_ref = match self.get_or_create(key, Some(class)).await? {
            Some(n) => n,
            None => return Ok(None),
        };
        let was_new = node_ref.0.is_new.load(Ordering::SeqCst);
        self.unschedule_idle(key).await;
        if was_new {
            self.reduce(&node_ref.0, &Action::no_op()).await?;
            node_ref.0.is_new.store(false, Ordering::SeqCst);
        }

        let snapshot = node_ref.state().await;
        if !snapshot.is_empty() {
            let changed: Vec<String> = snapshot.keys().cloned().collect();
            listener.on_changed(&changed, &snapshot).await;
        }

        Ok(Some(Subscription { key: key.to_string(), listener_id: id }))
    }

    /// Installs (or clears) the entry medium on a live node's reducer,
    /// under its instance lock. Returns `false` if `key` has no live node.
    pub async fn set_entry_medium(&self, key: &str, medium: Option<Arc<dyn crate::medium::Medium>>) -> bool {
        let node = match self.nodes.read().await.get(key).cloned() {
            Some(n) => n,
            None => return false,
        };
        node.reducer.lock().await.bind_entry_medium(medium).await;
        true
    }

    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let emptied = {
            let mut observers = self.observers.write().await;
            match observers.get_mut(&subscription.key) {
                Some(map) => {
                    map.shift_remove(&subscription.listener_id);
                    let empty = map.is_empty();
                    if empty {
                        observers.remove(&subscription.key);
                    }
                    empty
                }
                None => false,
            }
        };
        if emptied {
            self.on_observers_emptied(&subscription.key).await;
        }
    }

    async fn unsubscribe_by_identity(&self, key: &str, listener: &Arc<dyn Listener>) {
        let id = listener_id(listener);
        self.unsubscribe(&Subscription { key: key.to_string(), listener_id: id }).await;
    }

    async fn on_observers_emptied(&self, key: &str) {
        let recycle = {
            let nodes = self.nodes.read().await;
            nodes.get(key).map(|n| n.class.recycle)
        };
        match recycle {
            Some(RecycleOption::IdleTimeout(d)) if d > Duration::ZERO => {
                self.schedule_idle(key, d).await;
            }
            Some(_) => {
                self.retire(key).await;
            }
            None => {}
        }
    }

    async fn retire(&self, key: &str) {
        let node = match self.nodes.write().await.remove(key) {
            Some(n) => n,
            None => return,
        };
        self.unschedule_idle(key).await;
        node.barriers.lock().await.clear();
        self.release_outgoing_subscriptions(key).await;
        let ctx = NodeContext::new(self.dispatcher(), key.to_string());
        let mut guard = node.reducer.lock().await;
        guard.shutdown(&ctx).await;
    }

    /// Records a subscription `self_key`'s node obtained against some other
    /// node (possibly on a remote medium) so `retire` can release it.
    pub(crate) async fn track_outgoing_subscription(
        &self,
        self_key: &str,
        medium: Arc<dyn crate::medium::Medium>,
        subscription: Subscription,
    ) {
        let mut outgoing = self.outgoing_subscriptions.lock().await;
        outgoing.entry(self_key.to_string()).or_default().push(OutgoingSubscription {
            medium,
            subscription,
        });
    }

    /// Drops the bookkeeping entry for a subscription `self_key`'s node is
    /// releasing itself (via an explicit `unsubscribe` call, rather than
    /// through `retire`'s sweep).
    pub(crate) async fn untrack_outgoing_subscription(
        &self,
        self_key: &str,
        subscription: &Subscription,
    ) {
        let mut outgoing = self.outgoing_subscriptions.lock().await;
        if let Some(list) = outgoing.get_mut(self_key) {
            list.retain(|entry| entry.subscription.listener_id != subscription.listener_id
                || entry.subscription.key != subscription.key);
            if list.is_empty() {
                outgoing.remove(self_key);
            }
        }
    }

    /// Releases every outstanding subscription `key`'s node holds against
    /// other nodes, the counterpart to the source's "walk `subscribe_set`
    /// and call `unsubscribe` on each entry" retirement step (`spec.md`
    /// §4.7.3).
    async fn release_outgoing_subscriptions(&self, key: &str) {
        let entries = {
            let mut outgoing = self.outgoing_subscriptions.lock().await;
            outgoing.remove(key).unwrap_or_default()
        };
        for entry in entries {
            let _ = entry.medium.unsubscribe(key, &entry.subscription).await;
        }
    }

    async fn schedule_idle(&self, key: &str, timeout: Duration) {
        let at = Instant::now() + timeout;
        let mut scheduled = self.idle_scheduled.lock().await;
        let mut index = self.idle_index.lock().await;
        if let Some(prev) = scheduled.remove(key) {
            index.remove(&(prev, key.to_string()));
        }
        index.insert((at, key.to_string()));
        scheduled.insert(key.to_string(), at);
    }

    async fn unschedule_idle(&self, key: &str) {
        let mut scheduled = self.idle_scheduled.lock().await;
        let mut index = self.idle_index.lock().await;
        if let Some(prev) = scheduled.remove(key) {
            index.remove(&(prev, key.to_string()));
        }
    }

    async fn sweep_idle(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut index = self.idle_index.lock().await;
            let mut expired = Vec::new();
            loop {
                match index.iter().next().cloned() {
                    Some((when, key)) if when <= now => {
                        index.remove(&(when, key.clone()));
                        expired.push(key);
                    }
                    _ => break,
                }
            }
            expired
        };
        for key in expired {
            self.idle_scheduled.lock().await.remove(&key);
            tracing::debug!(key = %key, "idle sweep retiring node");
            self.retire(&key).await;
        }
    }
}

#[async_trait]
impl Dispatcher for Store {
    async fn dispatch_self(&self, key: &str, action: Action) -> bool {
        self.dispatch(key, action).await
    }

    async fn install_barrier(&self, key: &str, barrier: Barrier, timeout: Duration) {
        let barrier_id = barrier.id();
        let timeout_action = barrier.timeout_action();
        {
            let nodes = self.nodes.read().await;
            match nodes.get(key) {
                Some(node) => node.barriers.lock().await.push(barrier),
                None => return,
            }
        }

        let store = self.arc();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let fired = {
                let nodes = store.nodes.read().await;
                match nodes.get(&key) {
                    Some(node) => {
                        let mut barriers = node.barriers.lock().await;
                        if let Some(pos) = barriers.iter().position(|b| b.id() == barrier_id) {
                            barriers.remove(pos);
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            };
            if fired {
                store.dispatch(&key, timeout_action).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::SlotFn;
    use std::sync::atomic::AtomicU32;

    struct CounterReducer {
        mapping: IndexMap<String, SlotFn>,
        state: HashMap<String, Value>,
    }

    impl CounterReducer {
        fn new() -> Box<dyn Reducer> {
            let mut mapping = IndexMap::new();
            mapping.insert(
                "count".to_string(),
                SlotFn::new(|action, prior| async move {
                    let base = prior.and_then(|v| v.as_i64()).unwrap_or(0);
                    if action.matches("INCREMENT") {
                        Value::from(base + 1)
                    } else {
                        Value::from(base)
                    }
                }),
            );
            Box::new(CounterReducer { mapping, state: HashMap::new() })
        }
    }

    #[async_trait]
    impl Reducer for CounterReducer {
        fn mapping_and_state(&mut self) -> (&IndexMap<String, SlotFn>, &mut HashMap<String, Value>) {
            (&self.mapping, &mut self.state)
        }
        fn state(&self) -> &HashMap<String, Value> {
            &self.state
        }
    }

    static COUNTER_CLASS: ClassDef = ClassDef {
        key_prefix: "counter:",
        recycle: RecycleOption::Never,
        subscribe_action_set: &[],
        unsubscribe_action_set: &[],
        factory: CounterReducer::new,
    };

    struct RecordingListener {
        calls: std::sync::Mutex<Vec<HashMap<String, Value>>>,
    }

    #[async_trait]
    impl Listener for RecordingListener {
        async fn on_changed(&self, _changed: &[String], state: &HashMap<String, Value>) {
            self.calls.lock().expect("poisoned").push(state.clone());
        }
    }

    #[tokio::test]
    async fn dispatch_creates_node_from_prefix_and_reduces() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&COUNTER_CLASS).await.expect("register");

        let ok = store.dispatch("counter:a", Action::new("INCREMENT")).await;
        assert!(ok);
        let state = store.get("counter:a").await.expect("node exists");
        assert_eq!(state.get("count"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn soft_action_does_not_create_missing_target() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&COUNTER_CLASS).await.expect("register");
        let mut args = HashMap::new();
        args.insert("soft".to_string(), Value::from(true));
        let ok = store.dispatch("counter:missing", Action::with_arguments("INCREMENT", args)).await;
        assert!(ok);
        assert!(!store.contains("counter:missing").await);
    }

    #[tokio::test]
    async fn register_class_rejects_overlapping_prefix() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&COUNTER_CLASS).await.expect("register");
        static OVERLAP: ClassDef = ClassDef {
            key_prefix: "counter",
            recycle: RecycleOption::Never,
            subscribe_action_set: &[],
            unsubscribe_action_set: &[],
            factory: CounterReducer::new,
        };
        let result = store.register_class(&OVERLAP).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscribe_seeds_snapshot_and_holds_node_off_idle_index() {
        let store = Store::new(StoreConfig::default());
        static IDLE_CLASS: ClassDef = ClassDef {
            key_prefix: "idle:",
            recycle: RecycleOption::IdleTimeout(Duration::from_millis(50)),
            subscribe_action_set: &[],
            unsubscribe_action_set: &[],
            factory: CounterReducer::new,
        };
        store.register_class(&IDLE_CLASS).await.expect("register");
        store.dispatch("idle:a", Action::new("INCREMENT")).await;

        let listener: Arc<dyn Listener> =
            Arc::new(RecordingListener { calls: std::sync::Mutex::new(Vec::new()) });
        let sub = store.subscribe("idle:a", Arc::clone(&listener)).await.expect("ok").expect("some");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.contains("idle:a").await, "subscription should hold the node past its idle timeout");

        store.unsubscribe(&sub).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        store.sweep_idle().await;
        assert!(!store.contains("idle:a").await, "node should retire once unsubscribed and idle");
    }

    #[tokio::test]
    async fn idle_node_retires_after_timeout_with_no_listeners() {
        let store = Store::new(StoreConfig::default());
        static IDLE_ONLY_CLASS: ClassDef = ClassDef {
            key_prefix: "idleonly:",
            recycle: RecycleOption::IdleTimeout(Duration::from_millis(60)),
            subscribe_action_set: &[],
            unsubscribe_action_set: &[],
            factory: CounterReducer::new,
        };
        store.register_class(&IDLE_ONLY_CLASS).await.expect("register");

        store.dispatch("idleonly:test", Action::no_op()).await;
        assert!(store.contains("idleonly:test").await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.dispatch("idleonly:test", Action::no_op()).await;
        store.sweep_idle().await;
        assert!(store.contains("idleonly:test").await, "re-dispatch should push the idle deadline back out");

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.sweep_idle().await;
        assert!(!store.contains("idleonly:test").await, "node should retire once its idle timeout elapses");
    }

    #[tokio::test]
    async fn combine_barrier_times_out_and_emits_timeout_action() {
        let store = Store::new(StoreConfig::default());
        static COMBINE_TIMEOUT_CLASS: ClassDef = ClassDef {
            key_prefix: "combinetimeout:",
            recycle: RecycleOption::Never,
            subscribe_action_set: &[],
            unsubscribe_action_set: &[],
            factory: CounterReducer::new,
        };
        store.register_class(&COMBINE_TIMEOUT_CLASS).await.expect("register");
        store.dispatch("combinetimeout:a", Action::new("START")).await;

        let barrier = Barrier::combine(
            ["A".to_string(), "B".to_string()],
            Action::new("COMBINE_FINISH"),
            Action::new("INCREMENT"),
            false,
        );
        store.install_barrier("combinetimeout:a", barrier, Duration::from_millis(30)).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        let state = store.get("combinetimeout:a").await.expect("node exists");
        assert_eq!(
            state.get("count"),
            Some(&Value::from(1)),
            "timeout action should have been dispatched to the owner's key"
        );
    }

    #[tokio::test]
    async fn combine_barrier_finishes_on_last_required_type() {
        let store = Store::new(StoreConfig::default());
        static COMBINE_CLASS: ClassDef = ClassDef {
            key_prefix: "combine:",
            recycle: RecycleOption::Never,
            subscribe_action_set: &[],
            unsubscribe_action_set: &[],
            factory: CounterReducer::new,
        };
        store.register_class(&COMBINE_CLASS).await.expect("register");
        store.dispatch("combine:a", Action::new("START")).await;

        let barrier = Barrier::combine(
            ["A".to_string(), "B".to_string()],
            Action::new("INCREMENT"),
            Action::new("TIMEOUT_NOOP"),
            false,
        );
        store.install_barrier("combine:a", barrier, Duration::from_secs(5)).await;

        store.dispatch("combine:a", Action::new("A")).await;
        store.dispatch("combine:a", Action::new("B")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = store.get("combine:a").await.expect("node exists");
        assert_eq!(state.get("count"), Some(&Value::from(1)));
    }
}
