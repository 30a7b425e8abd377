//! `nodestore-remote` — cross-process transport: peer-to-peer
//! WebSocket connections carrying MessagePack frames, and the entry
//! transport binding external WebSocket clients to `PublicEntryReducer`
//! nodes over JSON (`spec.md` §4.5, §4.7, §6).
//!
//! This crate is the sole binary in the workspace; `nodestore-core` has no
//! knowledge of it.

pub mod config;
pub mod entry;
pub mod error;
pub mod http;
pub mod manager;
pub mod remote_medium;
pub mod wire;

pub use config::RemoteConfig;
pub use entry::EntryMedium;
pub use error::{RemoteError, RemoteResult};
pub use manager::{EntryRouteDef, RemoteManager};
pub use remote_medium::RemoteMedium;
