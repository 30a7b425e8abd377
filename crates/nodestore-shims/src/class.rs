//! The `ReducerClass` trait (`spec.md` §4.8; `SPEC_FULL.md` §4.8's
//! replacement for `original_source/redux/design.py`'s `@redux.behavior(...)`
//! decorator): class registration metadata declared as associated
//! functions/consts instead of attached by a decorator at import time.

use std::sync::OnceLock;

use nodestore_core::store::ClassDef;
use nodestore_core::{RecycleOption, Reducer};

/// Implemented by a concrete `Reducer` type that wants to register with a
/// `Store`. `class_def()` builds the `&'static ClassDef` the store's catalog
/// actually stores, memoizing it per concrete type so repeated registration
/// attempts (or multiple stores in the same process, as in tests) share one
/// instance.
pub trait ReducerClass: Reducer + Default + Send + Sync + 'static {
    /// The key prefix this class owns, e.g. `"counter:"`.
    fn key_prefix() -> &'static str;

    /// This class's retirement policy.
    fn recycle() -> RecycleOption;

    /// Action types that, when dispatched to a live instance, install a
    /// listener via `Reducer::enable_subscribe`.
    fn subscribe_action_set() -> &'static [&'static str] {
        &[]
    }

    /// Action types that, when dispatched to a live instance, remove a
    /// listener via `Reducer::enable_unsubscribe`.
    fn unsubscribe_action_set() -> &'static [&'static str] {
        &[]
    }

    /// Constructs a fresh instance for `Store::get_or_create`. The default
    /// just reaches for `Default`; override only if construction needs more
    /// than that.
    fn spawn() -> Box<dyn Reducer> {
        Box::new(Self::default())
    }

    fn class_def() -> &'static ClassDef {
        static CELL: OnceLock<ClassDef> = OnceLock::new();
        CELL.get_or_init(|| ClassDef {
            key_prefix: Self::key_prefix(),
            recycle: Self::recycle(),
            subscribe_action_set: Self::subscribe_action_set(),
            unsubscribe_action_set: Self::unsubscribe_action_set(),
            factory: Self::spawn,
        })
    }
}
