//! Subscription listeners (`spec.md` §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// A callback-bearing value notified when a subscribed node's public state
/// changes. Identity (not equality) is what distinguishes two listeners —
/// callers register `Arc<dyn Listener>` values and the store keys its
/// observer map by the pointer address of that `Arc`, so registering the
/// same `Arc` twice is idempotent.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Invoked sequentially, in registration order, after a `reduce` step
    /// commits new state. `changed` names the non-reserved slots whose
    /// value changed identity this dispatch; `state` is the full
    /// reserved-key-filtered public state after the change.
    async fn on_changed(&self, changed: &[String], state: &HashMap<String, Value>);
}

/// A stable identity for a registered listener, derived from the address of
/// the `Arc` it was registered with.
pub type ListenerId = usize;

/// Computes the identity key the store uses to deduplicate a listener
/// registration.
pub fn listener_id(listener: &Arc<dyn Listener>) -> ListenerId {
    Arc::as_ptr(listener) as *const () as usize
}

/// An opaque handle returned by `Store::subscribe`. Dropping it does not
/// unsubscribe — call `unsubscribe` explicitly, matching the source's
/// handle semantics, which are inert values rather than RAII guards.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub(crate) key: String,
    pub(crate) listener_id: ListenerId,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }
}
