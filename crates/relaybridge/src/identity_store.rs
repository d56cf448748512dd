use crate::storage::{get_list, put_list};
use crate::{Result, StorageAdapter};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable mapping between local event ids and the remote ids they produced.
///
/// One local event can map to several remote messages (long messages are
/// split by the network), and one remote message can be referenced by several
/// local events (a relayed edit re-sent as a new message keeps pointing at the
/// original local event).
#[async_trait]
pub trait EventIdentityStore: Send + Sync {
    async fn insert(&self, scope: &str, local_event_id: &str, remote_event_id: &str) -> Result<()>;

    async fn get_remote_ids(&self, scope: &str, local_event_id: &str) -> Result<Vec<String>>;

    async fn get_local_ids(&self, scope: &str, remote_event_id: &str) -> Result<Vec<String>>;

    /// Forgets a remote event and every back-reference to it.
    async fn remove(&self, scope: &str, remote_event_id: &str) -> Result<()>;
}

/// [`EventIdentityStore`] over any [`StorageAdapter`].
#[derive(Clone)]
pub struct KvEventIdentityStore {
    storage: Arc<dyn StorageAdapter>,
}

impl KvEventIdentityStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    fn local_key(scope: &str, local_event_id: &str) -> String {
        format!(
            "v1/events/{}/local/{}",
            urlencoding::encode(scope),
            urlencoding::encode(local_event_id)
        )
    }

    fn remote_key(scope: &str, remote_event_id: &str) -> String {
        format!(
            "v1/events/{}/remote/{}",
            urlencoding::encode(scope),
            urlencoding::encode(remote_event_id)
        )
    }

    fn append(&self, key: &str, value: &str) -> Result<()> {
        let mut values = get_list(self.storage.as_ref(), key)?;
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
            put_list(self.storage.as_ref(), key, &values)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventIdentityStore for KvEventIdentityStore {
    async fn insert(&self, scope: &str, local_event_id: &str, remote_event_id: &str) -> Result<()> {
        self.append(&Self::local_key(scope, local_event_id), remote_event_id)?;
        self.append(&Self::remote_key(scope, remote_event_id), local_event_id)
    }

    async fn get_remote_ids(&self, scope: &str, local_event_id: &str) -> Result<Vec<String>> {
        get_list(self.storage.as_ref(), &Self::local_key(scope, local_event_id))
    }

    async fn get_local_ids(&self, scope: &str, remote_event_id: &str) -> Result<Vec<String>> {
        get_list(self.storage.as_ref(), &Self::remote_key(scope, remote_event_id))
    }

    async fn remove(&self, scope: &str, remote_event_id: &str) -> Result<()> {
        let remote_key = Self::remote_key(scope, remote_event_id);
        for local_event_id in get_list(self.storage.as_ref(), &remote_key)? {
            let local_key = Self::local_key(scope, &local_event_id);
            let mut remote_ids = get_list(self.storage.as_ref(), &local_key)?;
            remote_ids.retain(|id| id != remote_event_id);
            put_list(self.storage.as_ref(), &local_key, &remote_ids)?;
        }
        self.storage.del(&remote_key)
    }
}
