//! The in-process medium (`spec.md` §4.5 "Local medium";
//! `original_source/redux/medium/local.py`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::error::{CoreError, CoreResult};
use crate::listener::{Listener, Subscription};
use crate::medium::{Medium, MediumKind};
use crate::store::Store;

/// Addresses another node in the same store. `send` is fire-and-forget
/// (the source schedules the target's dispatch on the scheduler rather
/// than awaiting it to completion); same-key operations always fail with
/// `CoreError::SameKey`, matching `local.py`'s `SameKeyError` guard.
#[derive(Clone)]
pub struct LocalMedium {
    store: Arc<Store>,
}

impl LocalMedium {
    pub fn new(store: Arc<Store>) -> Self {
        LocalMedium { store }
    }
}

#[async_trait]
impl Medium for LocalMedium {
    fn kind(&self) -> MediumKind {
        MediumKind::Local
    }

    async fn send(&self, self_key: &str, target_key: &str, action: Action) -> CoreResult<()> {
        if self_key == target_key {
            return Err(CoreError::SameKey);
        }
        let action = action.with_source_key(self_key.to_string()).with_medium(Arc::new(self.clone()));
        let store = Arc::clone(&self.store);
        let target_key = target_key.to_string();
        tokio::spawn(async move {
            store.dispatch(&target_key, action).await;
        });
        Ok(())
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
        let state = self.store.get(target_key).await;
        Ok(state.map(|s| match fields {
            Some(fields) => s.into_iter().filter(|(k, _)| fields.contains(k)).collect(),
            None => s,
        }))
    }

    async fn subscribe(
        &self,
        self_key: &str,
        target_key: &str,
        listener: Arc<dyn Listener>,
    ) -> CoreResult<Option<Subscription>> {
        if self_key == target_key {
            return Err(CoreError::SameKey);
        }
        let subscription = self.store.subscribe(target_key, listener).await?;
        if let Some(sub) = &subscription {
            let medium: Arc<dyn Medium> = Arc::new(self.clone());
            self.store.track_outgoing_subscription(self_key, medium, sub.clone()).await;
        }
        Ok(subscription)
    }

    async fn unsubscribe(&self, self_key: &str, subscription: &Subscription) -> CoreResult<()> {
        self.store.unsubscribe(subscription).await;
        self.store.untrack_outgoing_subscription(self_key, subscription).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::recycle::RecycleOption;
    use crate::reducer::{Reducer, SlotFn};
    use indexmap::IndexMap;

    struct EchoReducer {
        mapping: IndexMap<String, SlotFn>,
        state: HashMap<String, Value>,
    }

    impl EchoReducer {
        fn new() -> Box<dyn Reducer> {
            Box::new(EchoReducer { mapping: IndexMap::new(), state: HashMap::new() })
        }
    }

    #[async_trait]
    impl Reducer for EchoReducer {
        fn mapping_and_state(&mut self) -> (&IndexMap<String, SlotFn>, &mut HashMap<String, Value>) {
            (&self.mapping, &mut self.state)
        }
        fn state(&self) -> &HashMap<String, Value> {
            &self.state
        }
    }

    static ECHO_CLASS: crate::store::ClassDef = crate::store::ClassDef {
        key_prefix: "echo:",
        recycle: RecycleOption::Never,
        subscribe_action_set: &[],
        unsubscribe_action_set: &[],
        factory: EchoReducer::new,
    };

    #[tokio::test]
    async fn send_to_self_key_fails_with_same_key() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&ECHO_CLASS).await.expect("register");
        let medium = LocalMedium::new(Arc::clone(&store));
        let result = medium.send("echo:a", "echo:a", Action::new("PING")).await;
        assert!(matches!(result, Err(CoreError::SameKey)));
    }

    #[tokio::test]
    async fn send_dispatches_to_target_with_source_key_set() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&ECHO_CLASS).await.expect("register");
        let medium = LocalMedium::new(Arc::clone(&store));
        medium.send("echo:a", "echo:b", Action::new("PING")).await.expect("send ok");
        tokio::task::yield_now().await;
        assert!(store.contains("echo:b").await);
    }

    #[tokio::test]
    async fn get_state_projects_requested_fields() {
        let store = Store::new(StoreConfig::default());
        store.register_class(&ECHO_CLASS).await.expect("register");
        store.dispatch("echo:a", Action::new("__NO_OP")).await;
        let medium = LocalMedium::new(Arc::clone(&store));
        let result = medium.get_state("echo:caller", "echo:a", None).await.expect("ok");
        assert!(result.is_some());
    }
}
