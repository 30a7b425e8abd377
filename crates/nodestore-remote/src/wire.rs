//! Frame (un)marshalling shared by the peer and entry transports
//! (`spec.md` §4.5, §6; `original_source/redux/medium/base.py`).
//!
//! Local and Remote/Entry share these helpers so round-tripping an action
//! through any medium produces identical results, per the "Medium
//! polymorphism" design note.

use std::collections::HashMap;

use nodestore_core::reducer::is_reserved_slot;
use nodestore_core::Action;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A peer (process-to-process) frame. Encoded as a MessagePack map on the
/// wire; `__t__` is the frame type discriminant named by `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "__t__")]
pub enum PeerFrame {
    #[serde(rename = "ACTION")]
    Action {
        __k__: String,
        #[serde(default)]
        __r__: Option<String>,
        r#type: String,
        #[serde(flatten)]
        arguments: HashMap<String, Value>,
    },
    #[serde(rename = "PICK")]
    Pick {
        __k__: String,
        __r__: String,
        #[serde(default)]
        __f__: Option<Vec<String>>,
    },
    #[serde(rename = "PICKACK")]
    PickAck {
        __k__: String,
        __r__: String,
        #[serde(default)]
        __s__: Option<HashMap<String, Value>>,
    },
    #[serde(rename = "SUBSCRIBE")]
    Subscribe { __k__: String },
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe { __k__: String },
    #[serde(rename = "STATE")]
    State {
        __k__: String,
        #[serde(default)]
        __s__: Option<HashMap<String, Value>>,
    },
}

impl PeerFrame {
    pub fn target_key(&self) -> &str {
        match self {
            PeerFrame::Action { __k__, .. }
            | PeerFrame::Pick { __k__, .. }
            | PeerFrame::PickAck { __k__, .. }
            | PeerFrame::Subscribe { __k__ }
            | PeerFrame::Unsubscribe { __k__ }
            | PeerFrame::State { __k__, .. } => __k__,
        }
    }
}

/// Projects a state map the way `medium/base.py`'s `state_filter` does:
/// drop reserved (single-leading-underscore) slots first, then narrow to
/// `fields` if given.
pub fn state_filter(
    state: &HashMap<String, Value>,
    fields: Option<&[String]>,
) -> HashMap<String, Value> {
    let filtered: HashMap<String, Value> =
        state.iter().filter(|(k, _)| !is_reserved_slot(k)).map(|(k, v)| (k.clone(), v.clone())).collect();
    match fields {
        Some(fields) => filtered.into_iter().filter(|(k, _)| fields.iter().any(|f| f == k)).collect(),
        None => filtered,
    }
}

/// `to_message` — build an ACTION frame out of an action bound for
/// `target_key`, originating from `self_key`.
pub fn to_message(self_key: &str, target_key: &str, action: &Action) -> PeerFrame {
    PeerFrame::Action {
        __k__: target_key.to_string(),
        __r__: Some(self_key.to_string()),
        r#type: action.r#type().to_string(),
        arguments: action.public_arguments(),
    }
}

/// `from_message` — reconstruct `(target_key, Action)` from an ACTION
/// frame. `None` if `frame` is not an ACTION frame.
pub fn from_message(frame: PeerFrame) -> Option<(String, Action)> {
    match frame {
        PeerFrame::Action { __k__, __r__, r#type, arguments } => {
            let mut action = Action::with_arguments(r#type, arguments);
            if let Some(source) = __r__ {
                action = action.with_source_key(source);
            }
            Some((__k__, action))
        }
        _ => None,
    }
}

/// `to_pick_message` — build a PICK frame requesting `target_key`'s state,
/// projected to `fields` if given, correlated by the requester's own key.
pub fn to_pick_message(self_key: &str, target_key: &str, fields: Option<&[String]>) -> PeerFrame {
    PeerFrame::Pick {
        __k__: target_key.to_string(),
        __r__: self_key.to_string(),
        __f__: fields.map(|f| f.to_vec()),
    }
}

pub fn from_pick_message(frame: &PeerFrame) -> Option<(String, String, Option<Vec<String>>)> {
    match frame {
        PeerFrame::Pick { __k__, __r__, __f__ } => Some((__k__.clone(), __r__.clone(), __f__.clone())),
        _ => None,
    }
}

/// `to_pick_ack_message` — the PICKACK response to a PICK, `state = None`
/// when the target is absent.
pub fn to_pick_ack_message(
    target_key: &str,
    requester_key: &str,
    state: Option<HashMap<String, Value>>,
) -> PeerFrame {
    PeerFrame::PickAck { __k__: target_key.to_string(), __r__: requester_key.to_string(), __s__: state }
}

pub fn from_pick_ack_message(
    frame: &PeerFrame,
) -> Option<(String, String, Option<HashMap<String, Value>>)> {
    match frame {
        PeerFrame::PickAck { __k__, __r__, __s__ } => {
            Some((__k__.clone(), __r__.clone(), __s__.clone()))
        }
        _ => None,
    }
}

/// Parses an inbound entry JSON object into an action bound for whatever
/// key the entry transport resolves separately. Reserved (`__`-prefixed)
/// keys are stripped before they become arguments; `type` is pulled out as
/// the action tag.
pub fn entry_action_from_json(value: Value) -> Option<Action> {
    let obj = value.as_object()?;
    let r#type = obj.get("type")?.as_str()?.to_string();
    let arguments: HashMap<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "type" && !nodestore_core::action::is_reserved_argument(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(Action::with_arguments(r#type, arguments))
}

/// Serializes an action as an outbound entry JSON text frame.
pub fn entry_json_from_action(action: &Action) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("type".to_string(), Value::from(action.r#type()));
    for (k, v) in action.public_arguments() {
        obj.insert(k, v);
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_frame_round_trips_type_and_arguments() {
        let mut args = HashMap::new();
        args.insert("change".to_string(), Value::from(10));
        let action = Action::with_arguments("INCREASE_EQUITY", args);
        let frame = to_message("node:a", "node:b", &action);
        let bytes = rmp_serde::to_vec_named(&frame).expect("encode");
        let decoded: PeerFrame = rmp_serde::from_slice(&bytes).expect("decode");
        let (target, restored) = from_message(decoded).expect("action frame");
        assert_eq!(target, "node:b");
        assert!(restored.matches("INCREASE_EQUITY"));
        assert_eq!(restored.argument("change"), Some(&Value::from(10)));
    }

    #[test]
    fn state_filter_strips_reserved_slots_then_projects_fields() {
        let mut state = HashMap::new();
        state.insert("name".to_string(), Value::from("provider"));
        state.insert("age".to_string(), Value::from(1));
        state.insert("_cursor".to_string(), Value::from(7));

        let all = state_filter(&state, None);
        assert_eq!(all.len(), 2);

        let projected = state_filter(&state, Some(&["name".to_string()]));
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get("name"), Some(&Value::from("provider")));
    }

    #[test]
    fn entry_json_strips_reserved_arguments_and_round_trips_type() {
        let json = serde_json::json!({"type": "PING", "arg": 1, "__rid": "x"});
        let action = entry_action_from_json(json).expect("parses");
        assert!(action.matches("PING"));
        assert!(action.argument("__rid").is_none());
        let back = entry_json_from_action(&action);
        assert_eq!(back.get("type").and_then(|v| v.as_str()), Some("PING"));
    }
}
