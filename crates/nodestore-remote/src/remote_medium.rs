//! The cross-process medium (`spec.md` §4.5 "Remote medium";
//! `original_source/redux/medium/remote.py`'s `RemoteMedium`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nodestore_core::error::{CoreError, CoreResult};
use nodestore_core::listener::{Listener, Subscription};
use nodestore_core::medium::{Medium, MediumKind};
use nodestore_core::Action;
use serde_json::Value;

use crate::manager::RemoteManager;

/// Addresses a node living behind a specific peer connection. Cheap to
/// construct and clone — it is just `(manager, peer_id)` — matching the
/// source's `RemoteMedium(url, websocket)` being built fresh per message
/// rather than cached.
#[derive(Clone)]
pub struct RemoteMedium {
    manager: Arc<RemoteManager>,
    peer_id: String,
}

impl RemoteMedium {
    pub fn new(manager: Arc<RemoteManager>, peer_id: String) -> Self {
        RemoteMedium { manager, peer_id }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

#[async_trait]
impl Medium for RemoteMedium {
    fn kind(&self) -> MediumKind {
        MediumKind::Remote
    }

    async fn send(&self, self_key: &str, target_key: &str, action: Action) -> CoreResult<()> {
        if self_key == target_key {
            return Err(CoreError::SameKey);
        }
        self.manager
            .send_action(&self.peer_id, self_key, target_key, action)
            .await
            .map_err(|e| CoreError::Medium(e.to_string()))
    }

    async fn get_state(
        &self,
        self_key: &str,
        target_key: &str,
        fields: Option<&[String]>,
    ) -> CoreResult<Option<HashMap<String, Value>>> {
        if self_key == target_key {
            return Err(CoreError::SameKey);
        }
        self.manager
            .pick_state(&self.peer_id, self_key, target_key, fields)
            .await
            .map_err(|e| CoreError::Medium(e.to_string()))
    }

    /// Cross-process subscription is accepted-but-inert (`spec.md` §4.5,
    /// §9's open question, resolved in `SPEC_FULL.md` §9): the SUBSCRIBE
    /// frame type is parsed without error on the receiving end but no
    /// state-change stream is wired up, so there is nothing to return a
    /// live `Subscription` handle for.
    async fn subscribe(
        &self,
        self_key: &str,
        target_key: &str,
        _listener: Arc<dyn Listener>,
    ) -> CoreResult<Option<Subscription>> {
        if self_key == target_key {
            return Err(CoreError::SameKey);
        }
        Ok(None)
    }

    async fn unsubscribe(&self, _self_key: &str, _subscription: &Subscription) -> CoreResult<()> {
        Ok(())
    }
}
