//! `nodestore-core` — the store + reducer lifecycle engine, action
//! dispatch pipeline, subscription/recycle machinery, and the local medium.
//!
//! Remote transport (`nodestore-remote`) and node-role shims
//! (`nodestore-shims`) build on top of this crate; it has no knowledge of
//! either.

pub mod action;
pub mod combine;
pub mod config;
pub mod error;
pub mod listener;
pub mod local;
pub mod medium;
pub mod recycle;
pub mod reducer;
pub mod store;

pub use action::Action;
pub use combine::Barrier;
pub use error::{CoreError, CoreResult};
pub use listener::{Listener, Subscription};
pub use local::LocalMedium;
pub use medium::Medium;
pub use recycle::RecycleOption;
pub use reducer::{Dispatcher, NodeContext, Reducer, SlotFn};
pub use store::{ClassDef, NodeRef, Store};
