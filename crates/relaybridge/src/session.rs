use crate::ConversationKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// A linked account on the remote network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    /// Bridge-side identifier of the link, also the identity store scope.
    pub account: String,
    /// Remote user id the account's own sends appear under.
    pub user_id: String,
    #[serde(default)]
    pub is_bot: bool,
}

/// Owns the set of linked accounts. Linking an account that is already
/// linked replaces its handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, session: SessionHandle) -> Option<SessionHandle> {
        info!(account = %session.account, user_id = %session.user_id, "linking account");
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.account.clone(), session)
    }

    pub fn unlink(&self, account: &str) -> Option<SessionHandle> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(account);
        if removed.is_some() {
            info!(account, "unlinked account");
        }
        removed
    }

    pub fn get(&self, account: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(account)
            .cloned()
    }

    pub fn accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        accounts.sort();
        accounts
    }
}

/// Most recent remote message id seen or sent per conversation.
#[derive(Default)]
pub struct LastEventIds {
    ids: Mutex<HashMap<ConversationKey, String>>,
}

impl LastEventIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &ConversationKey, remote_event_id: &str) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), remote_event_id.to_string());
    }

    pub fn get(&self, key: &ConversationKey) -> Option<String> {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn is_last(&self, key: &ConversationKey, remote_event_id: &str) -> bool {
        self.get(key).as_deref() == Some(remote_event_id)
    }

    /// Drops every entry belonging to `account`.
    pub fn forget_account(&self, account: &str) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| key.account != account);
    }
}
