//! The message unit dispatched between nodes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::medium::Medium;

/// Reserved-argument marker. Any argument key beginning with this prefix is
/// stripped before the action is projected onto the wire or handed to a
/// slot reducer's view of "user" arguments; keeping this as the single
/// source of truth avoids the wire layer and the dispatch layer disagreeing
/// about what counts as internal.
pub const RESERVED_ARGUMENT_PREFIX: &str = "__";

/// The reserved no-op action type used to initialize a freshly created node
/// without running any real handling logic (`get_or_create`'s
/// initialize-only path, and the idle-retirement test scenarios).
pub const NO_OP: &str = "__NO_OP";

/// Returns true if an argument (or wire field) key is reserved and must
/// never reach user-visible state or a listener notification.
pub fn is_reserved_argument(key: &str) -> bool {
    key.starts_with(RESERVED_ARGUMENT_PREFIX)
}

/// An immutable tagged message: a type string plus a free-form argument map.
///
/// Cloning an `Action` clones its argument map; actions are small and are
/// cloned freely as they cross medium boundaries and slot reducers.
#[derive(Clone, Default)]
pub struct Action {
    r#type: String,
    arguments: HashMap<String, Value>,
    source_key: Option<String>,
    medium: Option<Arc<dyn Medium>>,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("type", &self.r#type)
            .field("arguments", &self.arguments)
            .field("source_key", &self.source_key)
            .field("medium", &self.medium.as_ref().map(|m| m.kind()))
            .finish()
    }
}

impl Action {
    /// Construct an action with no arguments.
    pub fn new(r#type: impl Into<String>) -> Self {
        Action { r#type: r#type.into(), arguments: HashMap::new(), source_key: None, medium: None }
    }

    /// Construct an action from a type and an argument map, as it would be
    /// parsed off an entry JSON frame or a peer msgpack frame.
    pub fn with_arguments(r#type: impl Into<String>, arguments: HashMap<String, Value>) -> Self {
        Action { r#type: r#type.into(), arguments, source_key: None, medium: None }
    }

    /// The reserved `__NO_OP` action used to initialize a node without
    /// running ordinary handling.
    pub fn no_op() -> Self {
        Action::new(NO_OP)
    }

    pub fn r#type(&self) -> &str {
        &self.r#type
    }

    /// Compares this action's type against a bare string, the Rust
    /// rendition of the source's `Action.__eq__(str)` overload.
    pub fn matches(&self, type_str: &str) -> bool {
        self.r#type == type_str
    }

    pub fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    pub fn with_source_key(mut self, source_key: impl Into<String>) -> Self {
        self.source_key = Some(source_key.into());
        self
    }

    /// The medium that introduced this action, absent when dispatched
    /// locally without going through any medium (e.g. a test harness
    /// dispatching straight into `Store::dispatch`).
    pub fn medium(&self) -> Option<&Arc<dyn Medium>> {
        self.medium.as_ref()
    }

    pub fn with_medium(mut self, medium: Arc<dyn Medium>) -> Self {
        self.medium = Some(medium);
        self
    }

    /// Get a single argument, bypassing the reserved-key filter — handlers
    /// are allowed to read reserved arguments (e.g. a transport layer
    /// reading its own correlation fields); only outward-facing views are
    /// filtered.
    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    /// A truthy `soft` argument marks this action as one that must not
    /// cause its target to be created.
    pub fn is_soft(&self) -> bool {
        matches!(self.arguments.get("soft"), Some(Value::Bool(true)))
    }

    /// User-visible arguments: the reserved-prefixed keys stripped out.
    /// This is what a wire emitter or a slot reducer's "public" view sees.
    pub fn public_arguments(&self) -> HashMap<String, Value> {
        self.arguments
            .iter()
            .filter(|(k, _)| !is_reserved_argument(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn arguments(&self) -> &HashMap<String, Value> {
        &self.arguments
    }

    pub fn into_arguments(self) -> HashMap<String, Value> {
        self.arguments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefix_is_double_underscore() {
        assert!(is_reserved_argument("__rid"));
        assert!(!is_reserved_argument("_rid"));
        assert!(!is_reserved_argument("amount"));
    }

    #[test]
    fn matches_compares_bare_type_string() {
        let a = Action::new("INCREASE_EQUITY");
        assert!(a.matches("INCREASE_EQUITY"));
        assert!(!a.matches("DECREASE_EQUITY"));
    }

    #[test]
    fn public_arguments_strips_reserved_keys_only() {
        let mut args = HashMap::new();
        args.insert("change".to_string(), Value::from(10));
        args.insert("__rid".to_string(), Value::from("abc"));
        let a = Action::with_arguments("INCREASE_EQUITY", args);
        let pub_args = a.public_arguments();
        assert_eq!(pub_args.len(), 1);
        assert!(pub_args.contains_key("change"));
    }

    #[test]
    fn soft_flag_requires_literal_true() {
        let mut args = HashMap::new();
        args.insert("soft".to_string(), Value::from(true));
        assert!(Action::with_arguments("X", args).is_soft());

        let mut args = HashMap::new();
        args.insert("soft".to_string(), Value::from("true"));
        assert!(!Action::with_arguments("X", args).is_soft());
    }
}
