//! `nodestore-shims` — the node-role shims (`spec.md` §4.8): ready-made
//! `Reducer` building blocks for the common node shapes (a plain state
//! machine, a socket-bound entry point, a fan-in internal entry point, a
//! stateless executor), plus the `ReducerClass` trait that stands in for
//! the source's `@redux.behavior(...)` class decorator.

pub mod class;
pub mod entry;
pub mod executor;
pub mod general;

pub use class::ReducerClass;
pub use entry::{find_node_id_by_pattern, EntryMediumCell, FindNodeId, InternalEntryReducer, PublicEntryReducer};
pub use executor::ExecutorReducer;
pub use general::GeneralReducer;
