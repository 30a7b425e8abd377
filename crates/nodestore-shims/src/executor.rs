//! `ExecutorReducer` (`spec.md` §4.8; `original_source/redux/design.py`'s
//! `ExecutorReducer`) — a stateless node that exists only to run behavior in
//! response to actions; it has no slot mapping at all.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use indexmap::IndexMap;
use nodestore_core::reducer::SlotFn;
use nodestore_core::Reducer;
use serde_json::Value;

fn empty_mapping() -> &'static IndexMap<String, SlotFn> {
    static MAPPING: OnceLock<IndexMap<String, SlotFn>> = OnceLock::new();
    MAPPING.get_or_init(IndexMap::new)
}

/// No slots to reduce over; `entry_key`/`realm` just carry routing context
/// the way the source's `ExecutorReducer.__init__` records them for its
/// subclasses to read back.
pub struct ExecutorReducer {
    state: HashMap<String, Value>,
    entry_key: Option<String>,
    realm: Vec<String>,
}

impl ExecutorReducer {
    pub fn new(entry_key: Option<String>, realm: Vec<String>) -> Self {
        ExecutorReducer { state: HashMap::new(), entry_key, realm }
    }

    pub fn entry_key(&self) -> Option<&str> {
        self.entry_key.as_deref()
    }

    pub fn realm(&self) -> &[String] {
        &self.realm
    }
}

impl Default for ExecutorReducer {
    fn default() -> Self {
        ExecutorReducer::new(None, Vec::new())
    }
}

#[async_trait]
impl Reducer for ExecutorReducer {
    fn mapping_and_state(&mut self) -> (&IndexMap<String, SlotFn>, &mut HashMap<String, Value>) {
        (empty_mapping(), &mut self.state)
    }

    fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_routing_context_with_no_slots() {
        let mut reducer = ExecutorReducer::new(Some("session:1".to_string()), vec!["billing".to_string()]);
        assert_eq!(reducer.entry_key(), Some("session:1"));
        assert_eq!(reducer.realm(), &["billing".to_string()]);
        let (mapping, _) = reducer.mapping_and_state();
        assert!(mapping.is_empty());
    }
}
