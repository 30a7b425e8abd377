//! The abstract capability to address another node (`spec.md` §4.5, §9
//! "Medium polymorphism").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::error::CoreResult;
use crate::listener::{Listener, Subscription};

/// Which of the three medium kinds introduced an action, the Rust rendition
/// of `isinstance(action.medium, EntryMedium)`-style checks in
/// `original_source/redux/design.py`'s `PublicEntryReducer.action_received`.
/// Comparing `Medium::kind()` values stands in for downcasting a trait
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumKind {
    Local,
    Remote,
    Entry,
}

/// A uniform capability to reach another node, local or remote. `Local`
/// lives here; `Remote` and `Entry` are implemented by `nodestore-remote`
/// against the same trait, so `nodestore-core` never references the
/// transport crate.
#[async_trait]
pub trait Medium: Send + Sync {
    /// Which kind of medium this is, for hooks that branch on how an action
    /// arrived (`spec.md` §4.8's entry-vs-internal split).
    fn kind(&self) -> MediumKind;

    /// Deliver `action` to `target_key` so that its dispatch observes
    /// `action.source_key() == Some(self_key)` and a medium value referring
    /// back to this one. Fails with `CoreError::SameKey` if
    /// `target_key == self_key`.
    async fn send(&self, self_key: &str, target_key: &str, action: Action) -> CoreResult<()>;

    /// Retrieve a snapshot projection of the target's public state, narrowed
    /// to `fields` if given. `Ok(None)` if the target is absent.
    async fn get_state(
        &self,
        self_key: &str,
        target_key: &str,
        fields: Option<&[String]>,
    ) -> CoreResult<Option<HashMap<String, Value>>>;

    /// Stream future state changes of `target_key` back to `self_key`.
    async fn subscribe(
        &self,
        self_key: &str,
        target_key: &str,
        listener: Arc<dyn Listener>,
    ) -> CoreResult<Option<Subscription>>;

    /// `subscription` carries the target key it was issued against, so only
    /// `self_key` (kept for parity with the other three operations and for
    /// logging) needs to be supplied explicitly.
    async fn unsubscribe(&self, self_key: &str, subscription: &Subscription) -> CoreResult<()>;
}
