//! In-memory stand-ins for the remote network, used by the integration tests
//! and by `rbctl replay`.

use crate::{
    Attachment, Conversation, Error, MessageKind, OutgoingContent, OutgoingMessage, RemoteMessage,
    RemoteNetwork, Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A call the bridge made into the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum NetworkCall {
    #[serde(rename_all = "camelCase")]
    Send {
        account: String,
        conversation_id: String,
        message: OutgoingMessage,
        remote_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Edit {
        account: String,
        conversation_id: String,
        remote_event_id: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        account: String,
        conversation_id: String,
        remote_event_id: String,
    },
    #[serde(rename_all = "camelCase")]
    React {
        account: String,
        conversation_id: String,
        remote_event_id: String,
        reaction: String,
    },
}

/// Remote network simulation. Assigns increasing numeric ids, records every
/// call and can be told to fail, stall or split sends.
pub struct SimulatedNetwork {
    next_id: AtomicU64,
    failures: AtomicUsize,
    conversations: Mutex<HashMap<String, Conversation>>,
    relay_identities: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<NetworkCall>>,
    settings: Mutex<Settings>,
}

#[derive(Default, Clone, Copy)]
struct Settings {
    send_delay: Duration,
    split_len: Option<usize>,
    reject_uploads: bool,
    fail_deletes: bool,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            failures: AtomicUsize::new(0),
            conversations: Mutex::new(HashMap::new()),
            relay_identities: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            settings: Mutex::new(Settings::default()),
        }
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation.id.clone(), conversation);
    }

    /// Creates the relay identity (webhook) for a conversation and returns
    /// its id.
    pub fn create_relay_identity(&self, conversation_id: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.relay_identities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation_id.to_string(), id.clone());
        id
    }

    /// The next `count` sends or edits fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.settings().send_delay = delay;
    }

    /// Splits text sends into parts of at most `len` characters, one remote
    /// message each.
    pub fn set_split_len(&self, len: Option<usize>) {
        self.settings().split_len = len;
    }

    pub fn set_reject_uploads(&self, reject: bool) {
        self.settings().reject_uploads = reject;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.settings().fail_deletes = fail;
    }

    pub fn calls(&self) -> Vec<NetworkCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bodies of every text send, in call order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NetworkCall::Send { message, .. } => match message.content {
                    OutgoingContent::Text { body, .. } => Some(body),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    /// The messages the network reports back for a send, one per remote id.
    /// Relayed sends are authored by the conversation's relay identity.
    pub fn echoes_of(
        &self,
        author_id: &str,
        conversation: &Conversation,
        message: &OutgoingMessage,
        remote_ids: &[String],
    ) -> Vec<RemoteMessage> {
        let relay_identity = message
            .relay_as
            .as_ref()
            .and_then(|_| self.relay_identity_of(&conversation.id));
        let author_id = relay_identity
            .clone()
            .unwrap_or_else(|| author_id.to_string());
        let parts = self.parts_of(message, remote_ids.len());

        remote_ids
            .iter()
            .zip(parts)
            .map(|(id, (content, attachments, embed_count))| RemoteMessage {
                id: id.clone(),
                conversation: conversation.clone(),
                author_id: author_id.clone(),
                content,
                attachments,
                embed_count,
                relay_identity: relay_identity.clone(),
                reply_to: None,
                kind: MessageKind::Default,
            })
            .collect()
    }

    fn parts_of(
        &self,
        message: &OutgoingMessage,
        count: usize,
    ) -> Vec<(String, Vec<Attachment>, usize)> {
        let mut parts: Vec<(String, Vec<Attachment>, usize)> = match &message.content {
            OutgoingContent::Text { body, .. } => self
                .split(body)
                .into_iter()
                .map(|part| (part, Vec::new(), 0))
                .collect(),
            OutgoingContent::Attachment { filename, url } => vec![(
                String::new(),
                vec![Attachment {
                    name: filename.clone(),
                    url: url.clone(),
                }],
                0,
            )],
            OutgoingContent::ImageEmbed { .. } => vec![(String::new(), Vec::new(), 1)],
        };
        parts.truncate(count);
        parts
    }

    fn split(&self, body: &str) -> Vec<String> {
        match self.snapshot().split_len {
            Some(len) if len > 0 && body.chars().count() > len => body
                .chars()
                .collect::<Vec<_>>()
                .chunks(len)
                .map(|chunk| chunk.iter().collect())
                .collect(),
            _ => vec![body.to_string()],
        }
    }

    fn relay_identity_of(&self, conversation_id: &str) -> Option<String> {
        self.relay_identities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
    }

    fn settings(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> Settings {
        *self.settings()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn record(&self, call: NetworkCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl RemoteNetwork for SimulatedNetwork {
    async fn resolve_conversation(
        &self,
        _account: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned())
    }

    async fn relay_identity(
        &self,
        _account: &str,
        conversation: &Conversation,
    ) -> Result<Option<String>> {
        Ok(self.relay_identity_of(&conversation.id))
    }

    async fn send(
        &self,
        account: &str,
        conversation: &Conversation,
        message: &OutgoingMessage,
    ) -> Result<Vec<String>> {
        let settings = self.snapshot();
        if !settings.send_delay.is_zero() {
            tokio::time::sleep(settings.send_delay).await;
        }
        if self.take_failure() {
            return Err(Error::Network("simulated send failure".to_string()));
        }
        if settings.reject_uploads && matches!(message.content, OutgoingContent::Attachment { .. }) {
            return Err(Error::Network("Request entity too large".to_string()));
        }

        let parts = match &message.content {
            OutgoingContent::Text { body, .. } => self.split(body).len(),
            _ => 1,
        };
        let remote_ids: Vec<String> = (0..parts).map(|_| self.next_id()).collect();
        self.record(NetworkCall::Send {
            account: account.to_string(),
            conversation_id: conversation.id.clone(),
            message: message.clone(),
            remote_ids: remote_ids.clone(),
        });
        Ok(remote_ids)
    }

    async fn edit(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
        body: &str,
    ) -> Result<Vec<String>> {
        if self.take_failure() {
            return Err(Error::Network("simulated edit failure".to_string()));
        }
        self.record(NetworkCall::Edit {
            account: account.to_string(),
            conversation_id: conversation.id.clone(),
            remote_event_id: remote_event_id.to_string(),
            body: body.to_string(),
        });
        Ok(vec![remote_event_id.to_string()])
    }

    async fn delete(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
    ) -> Result<()> {
        if self.snapshot().fail_deletes {
            return Err(Error::Network("Missing permissions".to_string()));
        }
        self.record(NetworkCall::Delete {
            account: account.to_string(),
            conversation_id: conversation.id.clone(),
            remote_event_id: remote_event_id.to_string(),
        });
        Ok(())
    }

    async fn react(
        &self,
        account: &str,
        conversation: &Conversation,
        remote_event_id: &str,
        reaction: &str,
    ) -> Result<()> {
        self.record(NetworkCall::React {
            account: account.to_string(),
            conversation_id: conversation.id.clone(),
            remote_event_id: remote_event_id.to_string(),
            reaction: reaction.to_string(),
        });
        Ok(())
    }
}

/// A plain text message as the remote network would report it.
pub fn remote_text(id: &str, conversation: &Conversation, author_id: &str, content: &str) -> RemoteMessage {
    RemoteMessage {
        id: id.to_string(),
        conversation: conversation.clone(),
        author_id: author_id.to_string(),
        content: content.to_string(),
        attachments: Vec::new(),
        embed_count: 0,
        relay_identity: None,
        reply_to: None,
        kind: MessageKind::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn long_text_is_split_into_parts() {
        let network = SimulatedNetwork::new();
        network.set_split_len(Some(4));
        let chan = Conversation::direct("dm", "bob");
        let message = OutgoingMessage::text("abcdefghij", None);

        let ids = network.send("1", &chan, &message).await.unwrap();
        assert_eq!(ids.len(), 3);

        let echoes = network.echoes_of("me", &chan, &message, &ids);
        let contents: Vec<&str> = echoes.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn failures_are_counted_down() {
        let network = SimulatedNetwork::new();
        network.fail_next(1);
        let chan = Conversation::direct("dm", "bob");
        let message = OutgoingMessage::text("x", None);

        assert!(network.send("1", &chan, &message).await.is_err());
        assert!(network.send("1", &chan, &message).await.is_ok());
        assert_eq!(network.calls().len(), 1);
    }
}
