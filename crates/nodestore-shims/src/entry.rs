//! Entry-point node shapes (`spec.md` §4.8; `original_source/redux/design.py`'s
//! `PublicEntryReducer`/`InternalEntryReducer`).
//!
//! `PublicEntryReducer` binds one external client socket to exactly one
//! node key; `InternalEntryReducer` is the opposite shape — one physical
//! connection multiplexing several sessions, tracked as a set of mediums
//! rather than a single one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nodestore_core::medium::MediumKind;
use nodestore_core::reducer::{NodeContext, SlotFn};
use nodestore_core::{Action, Medium};

/// Storage for the medium a `PublicEntryReducer`-shaped node was bound to,
/// factored out of the trait so a concrete type just holds one field and
/// forwards to it — the composition stands in for the source attaching
/// `self.entry_medium` directly in `__init__`.
#[derive(Default)]
pub struct EntryMediumCell(Option<Arc<dyn Medium>>);

impl EntryMediumCell {
    pub fn get(&self) -> Option<&Arc<dyn Medium>> {
        self.0.as_ref()
    }

    pub fn set(&mut self, medium: Option<Arc<dyn Medium>>) {
        self.0 = medium;
    }
}

/// A node bound one-to-one to an external client connection. A concrete
/// type implements this alongside `Reducer`, storing an [`EntryMediumCell`]
/// and forwarding `Reducer::bind_entry_medium`/`Reducer::action_received` to
/// [`PublicEntryReducer::set_entry_medium`]/[`route_action_received`] —
/// the same one-line forwarding a Python subclass got for free from
/// inheritance, made explicit here since Rust has no such implicit override.
#[async_trait]
pub trait PublicEntryReducer: Send + Sync {
    fn entry_medium(&self) -> Option<&Arc<dyn Medium>>;
    fn set_entry_medium(&mut self, medium: Option<Arc<dyn Medium>>);

    /// Handling for an action that arrived over this node's own bound
    /// socket (`action.medium()` is the `Entry` medium this node installed).
    async fn entry_action_received(&mut self, _action: &Action, _ctx: &NodeContext) {}

    /// Handling for any other action (a local dispatch, or one arriving
    /// over a `Remote` medium from a peer).
    async fn internal_action_received(&mut self, _action: &Action, _ctx: &NodeContext) {}

    /// `design.py`'s `PublicEntryReducer.action_received`: branch on whether
    /// the action's medium is the one this node's own socket installed.
    /// A concrete type's `Reducer::action_received` override should just
    /// call this.
    async fn route_action_received(&mut self, action: &Action, ctx: &NodeContext) {
        match action.medium().map(|m| m.kind()) {
            Some(MediumKind::Entry) => self.entry_action_received(action, ctx).await,
            _ => self.internal_action_received(action, ctx).await,
        }
    }
}

/// Resolves a node id from a request path/query, the way a concrete
/// `PublicEntryReducer` subclass's `find_node_id` static method did in the
/// source — e.g. parsing `/tick/entry/(.+)` out of the path. `nodestore-remote`
/// calls this through a `fn` pointer stored in `EntryRouteDef`, so it has no
/// dependency on this crate.
pub type FindNodeId = fn(key_prefix: &str, path: &str, query: &str) -> Option<String>;

/// Matches `path` against `pattern`'s first capture group, the Rust
/// rendition of a `url_pattern=r"..."` class attribute from
/// `original_source/example/tick.py` (`url_pattern=r"/tick/entry/(.+)"`).
/// A concrete `find_node_id` implementation compiles its pattern once
/// (e.g. in a `std::sync::OnceLock`) and calls this to extract the id.
pub fn find_node_id_by_pattern(pattern: &regex::Regex, path: &str) -> Option<String> {
    pattern.captures(path)?.get(1).map(|m| m.as_str().to_string())
}

/// A node multiplexed over one physical connection on behalf of several
/// sessions at once — tracked as a set of mediums rather than a single
/// bound one, mirroring `design.py`'s `self.entry_mediums = set()`.
pub struct InternalEntryReducer {
    mapping: indexmap::IndexMap<String, SlotFn>,
    state: HashMap<String, serde_json::Value>,
    entry_mediums: Vec<Arc<dyn Medium>>,
}

impl InternalEntryReducer {
    pub fn new(mapping: indexmap::IndexMap<String, SlotFn>) -> Self {
        InternalEntryReducer { mapping, state: HashMap::new(), entry_mediums: Vec::new() }
    }

    pub fn entry_mediums(&self) -> &[Arc<dyn Medium>] {
        &self.entry_mediums
    }

    pub fn add_entry_medium(&mut self, medium: Arc<dyn Medium>) {
        self.entry_mediums.push(medium);
    }

    pub fn remove_entry_medium(&mut self, medium: &Arc<dyn Medium>) {
        self.entry_mediums.retain(|m| !Arc::ptr_eq(m, medium));
    }
}

impl Default for InternalEntryReducer {
    fn default() -> Self {
        InternalEntryReducer::new(indexmap::IndexMap::new())
    }
}

#[async_trait]
impl nodestore_core::Reducer for InternalEntryReducer {
    fn mapping_and_state(
        &mut self,
    ) -> (&indexmap::IndexMap<String, SlotFn>, &mut HashMap<String, serde_json::Value>) {
        (&self.mapping, &mut self.state)
    }

    fn state(&self) -> &HashMap<String, serde_json::Value> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_extracts_capture_group() {
        let pattern = regex::Regex::new(r"/tick/entry/(.+)").expect("valid pattern");
        assert_eq!(find_node_id_by_pattern(&pattern, "/tick/entry/abc123"), Some("abc123".to_string()));
        assert_eq!(find_node_id_by_pattern(&pattern, "/other/path"), None);
    }

    #[test]
    fn entry_medium_cell_round_trips() {
        let mut cell = EntryMediumCell::default();
        assert!(cell.get().is_none());
        struct Noop;
        #[async_trait]
        impl Medium for Noop {
            fn kind(&self) -> MediumKind {
                MediumKind::Entry
            }
            async fn send(
                &self,
                _self_key: &str,
                _target_key: &str,
                _action: Action,
            ) -> nodestore_core::CoreResult<()> {
                Ok(())
            }
            async fn get_state(
                &self,
                _self_key: &str,
                _target_key: &str,
                _fields: Option<&[String]>,
            ) -> nodestore_core::CoreResult<Option<HashMap<String, serde_json::Value>>> {
                Ok(None)
            }
            async fn subscribe(
                &self,
                _self_key: &str,
                _target_key: &str,
                _listener: Arc<dyn nodestore_core::Listener>,
            ) -> nodestore_core::CoreResult<Option<nodestore_core::Subscription>> {
                Ok(None)
            }
            async fn unsubscribe(
                &self,
                _self_key: &str,
                _subscription: &nodestore_core::Subscription,
            ) -> nodestore_core::CoreResult<()> {
                Ok(())
            }
        }
        cell.set(Some(Arc::new(Noop)));
        assert!(cell.get().is_some());
    }
}
