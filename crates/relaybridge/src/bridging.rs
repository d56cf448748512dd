use crate::{Conversation, ConversationKind, Result, StorageAdapter};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait BridgingFlags: Send + Sync {
    async fn is_conversation_bridged(&self, account: &str, conversation: &Conversation)
        -> Result<bool>;
}

/// Bridging flags kept in a [`StorageAdapter`].
///
/// Direct and group messages are always bridged. A guild channel is bridged
/// when the account bridges everything, when its guild is bridged, or when
/// the channel itself was opted in.
#[derive(Clone)]
pub struct KvBridgingFlags {
    storage: Arc<dyn StorageAdapter>,
}

impl KvBridgingFlags {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    fn all_key(account: &str) -> String {
        format!("v1/flags/{}/all", urlencoding::encode(account))
    }

    fn guild_prefix(account: &str) -> String {
        format!("v1/flags/{}/guild/", urlencoding::encode(account))
    }

    fn channel_prefix(account: &str) -> String {
        format!("v1/flags/{}/channel/", urlencoding::encode(account))
    }

    pub fn set_bridge_all(&self, account: &str, enabled: bool) -> Result<()> {
        if enabled {
            self.storage.put(&Self::all_key(account), "true".to_string())
        } else {
            self.storage.del(&Self::all_key(account))
        }
    }

    pub fn bridges_all(&self, account: &str) -> Result<bool> {
        Ok(self.storage.get(&Self::all_key(account))?.is_some())
    }

    pub fn set_guild_bridged(&self, account: &str, guild_id: &str, bridged: bool) -> Result<()> {
        self.set_flag(&Self::guild_prefix(account), guild_id, bridged)
    }

    pub fn set_channel_bridged(&self, account: &str, channel_id: &str, bridged: bool) -> Result<()> {
        self.set_flag(&Self::channel_prefix(account), channel_id, bridged)
    }

    pub fn bridged_guilds(&self, account: &str) -> Result<Vec<String>> {
        self.list_flags(&Self::guild_prefix(account))
    }

    pub fn bridged_channels(&self, account: &str) -> Result<Vec<String>> {
        self.list_flags(&Self::channel_prefix(account))
    }

    fn set_flag(&self, prefix: &str, id: &str, on: bool) -> Result<()> {
        let key = format!("{}{}", prefix, urlencoding::encode(id));
        if on {
            self.storage.put(&key, "true".to_string())
        } else {
            self.storage.del(&key)
        }
    }

    fn is_flagged(&self, prefix: &str, id: &str) -> Result<bool> {
        let key = format!("{}{}", prefix, urlencoding::encode(id));
        Ok(self.storage.get(&key)?.is_some())
    }

    fn list_flags(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .storage
            .list(prefix)?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(prefix)
                    .and_then(|id| urlencoding::decode(id).ok())
                    .map(|id| id.into_owned())
            })
            .collect())
    }
}

#[async_trait]
impl BridgingFlags for KvBridgingFlags {
    async fn is_conversation_bridged(
        &self,
        account: &str,
        conversation: &Conversation,
    ) -> Result<bool> {
        match &conversation.kind {
            ConversationKind::DirectMessage { .. } | ConversationKind::GroupMessage { .. } => {
                Ok(true)
            }
            ConversationKind::GuildChannel { guild_id, .. } => Ok(self.bridges_all(account)?
                || self.is_flagged(&Self::guild_prefix(account), guild_id)?
                || self.is_flagged(&Self::channel_prefix(account), &conversation.id)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;

    fn flags() -> KvBridgingFlags {
        KvBridgingFlags::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn direct_messages_are_always_bridged() {
        let flags = flags();
        let dm = Conversation::direct("dm", "bob");
        assert!(flags.is_conversation_bridged("1", &dm).await.unwrap());
    }

    #[tokio::test]
    async fn guild_channel_needs_a_flag() {
        let flags = flags();
        let chan = Conversation::guild_channel("c1", "g1", "Guild", "general");
        assert!(!flags.is_conversation_bridged("1", &chan).await.unwrap());

        flags.set_channel_bridged("1", "c1", true).unwrap();
        assert!(flags.is_conversation_bridged("1", &chan).await.unwrap());
        assert!(!flags.is_conversation_bridged("2", &chan).await.unwrap());

        flags.set_channel_bridged("1", "c1", false).unwrap();
        flags.set_guild_bridged("1", "g1", true).unwrap();
        assert!(flags.is_conversation_bridged("1", &chan).await.unwrap());
        assert_eq!(flags.bridged_guilds("1").unwrap(), vec!["g1"]);
    }

    #[tokio::test]
    async fn bridge_all_covers_every_guild() {
        let flags = flags();
        flags.set_bridge_all("1", true).unwrap();
        let chan = Conversation::guild_channel("c9", "g9", "Other", "random");
        assert!(flags.is_conversation_bridged("1", &chan).await.unwrap());

        flags.set_bridge_all("1", false).unwrap();
        assert!(!flags.is_conversation_bridged("1", &chan).await.unwrap());
    }
}
