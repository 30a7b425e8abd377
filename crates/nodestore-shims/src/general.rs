//! `GeneralReducer` (`spec.md` §4.8; `original_source/redux/design.py`'s
//! `GeneralReducer`) — a plain state machine: a slot mapping plus an
//! optional entry key, no socket binding or fan-in behavior of its own.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use nodestore_core::reducer::SlotFn;
use nodestore_core::Reducer;
use serde_json::Value;

/// The ordinary internal node shape: a slot mapping driving reduction, with
/// an optional `entry_key` recording which external session (if any) this
/// node was spawned on behalf of.
pub struct GeneralReducer {
    mapping: IndexMap<String, SlotFn>,
    state: HashMap<String, Value>,
    entry_key: Option<String>,
}

impl GeneralReducer {
    pub fn new(mapping: IndexMap<String, SlotFn>) -> Self {
        GeneralReducer { mapping, state: HashMap::new(), entry_key: None }
    }

    pub fn with_entry_key(mapping: IndexMap<String, SlotFn>, entry_key: impl Into<String>) -> Self {
        GeneralReducer { mapping, state: HashMap::new(), entry_key: Some(entry_key.into()) }
    }

    pub fn entry_key(&self) -> Option<&str> {
        self.entry_key.as_deref()
    }
}

impl Default for GeneralReducer {
    fn default() -> Self {
        GeneralReducer::new(IndexMap::new())
    }
}

#[async_trait]
impl Reducer for GeneralReducer {
    fn mapping_and_state(&mut self) -> (&IndexMap<String, SlotFn>, &mut HashMap<String, Value>) {
        (&self.mapping, &mut self.state)
    }

    fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_core::Action;

    #[tokio::test]
    async fn slot_mapping_drives_state() {
        let mut mapping = IndexMap::new();
        mapping.insert(
            "count".to_string(),
            SlotFn::new(|_action, prior| async move {
                Value::from(prior.and_then(|v| v.as_i64()).unwrap_or(0) + 1)
            }),
        );
        let mut reducer = GeneralReducer::new(mapping);
        let (mapping, state) = reducer.mapping_and_state();
        for (slot, f) in mapping.clone() {
            let prior = state.get(&slot).cloned();
            let next = f.call(Action::new("TICK"), prior).await;
            state.insert(slot, next);
        }
        assert_eq!(reducer.state().get("count"), Some(&Value::from(1)));
    }
}
