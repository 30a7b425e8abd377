//! The core error taxonomy (`spec.md` §7).

use thiserror::Error;

/// Errors surfaced by `nodestore-core` operations.
///
/// Most operations return `Result<Option<T>, CoreError>` rather than
/// folding "absent" into the error channel: `Ok(None)` is "no such node /
/// no such state", `Err(e)` is a genuine failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A medium operation addressed the caller's own key.
    #[error("medium operation addressed the caller's own key")]
    SameKey,

    /// A subscription or dispatch named a key whose prefix matches no
    /// registered class, or a class registration conflicted with an
    /// existing one.
    #[error("no class registered for key `{0}`")]
    Key(String),

    /// A reducer's `initialize` hook, or a slot reducer invoked during
    /// `reduce`, returned an error.
    #[error("reducer `{key}` failed: {source}")]
    Reducer {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A `Remote`/`Entry` medium operation failed at the transport layer
    /// (connection closed, decode failure, pick timeout). `nodestore-core`
    /// never references `nodestore-remote`'s `RemoteError` type directly —
    /// the transport crate flattens it to this variant's message when
    /// surfacing a failure through the `Medium` trait.
    #[error("medium operation failed: {0}")]
    Medium(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
