use crate::{Conversation, OutgoingMessage, Result};
use async_trait::async_trait;

/// The remote network client, as seen by the outbound pipeline and the
/// inbound filter. Every call is a suspension point.
#[async_trait]
pub trait RemoteNetwork: Send + Sync {
    /// Looks up a conversation the account can post into.
    async fn resolve_conversation(
        &self,
        account: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>>;

    /// Id of the relay identity (webhook) this bridge owns in `conversation`.
    async fn relay_identity(
        &self,
        account: &str,
        conversation: &Conversation,
    ) -> Result<Option<String>>;

    /// Sends a message and returns the ids of every remote message it became.
    async fn send(
        &self,
        account: &str,
        conversation: &Conversation,
        message: &OutgoingMessage,
    ) -> Result<Vec<String>>;

    async fn edit(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
        body: &str,
    ) -> Result<Vec<String>>;

    async fn delete(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
    ) -> Result<()>;

    async fn react(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
        reaction: &str,
    ) -> Result<()>;
}
