use serde::{Deserialize, Serialize};
use std::fmt;

/// Scopes all dedup and lock state to one conversation on one bridged account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub account: String,
    pub conversation: String,
}

impl ConversationKey {
    pub fn new(account: impl Into<String>, conversation: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            conversation: conversation.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.account, self.conversation)
    }
}

/// Channel classification, decided once by the network adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConversationKind {
    DirectMessage {
        recipient: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        name: Option<String>,
        recipients: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    GuildChannel {
        guild_id: String,
        guild_name: String,
        channel_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
}

impl Conversation {
    pub fn direct(id: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::DirectMessage {
                recipient: recipient.into(),
            },
        }
    }

    pub fn guild_channel(
        id: impl Into<String>,
        guild_id: impl Into<String>,
        guild_name: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::GuildChannel {
                guild_id: guild_id.into(),
                guild_name: guild_name.into(),
                channel_name: channel_name.into(),
            },
        }
    }

    pub fn guild_id(&self) -> Option<&str> {
        match &self.kind {
            ConversationKind::GuildChannel { guild_id, .. } => Some(guild_id),
            _ => None,
        }
    }

    /// Text of the notice posted when a send into this conversation fails.
    pub fn send_failure_notice(&self) -> String {
        match &self.kind {
            ConversationKind::DirectMessage { recipient } => {
                format!("Failed to send message to DM with user {}", recipient)
            }
            ConversationKind::GroupMessage { name, recipients } => {
                let name = match name {
                    Some(name) if !name.is_empty() => name.clone(),
                    _ => recipients.join(", "),
                };
                format!("Failed to send message into Group DM {}", name)
            }
            ConversationKind::GuildChannel {
                guild_name,
                channel_name,
                ..
            } => format!(
                "Failed to send message into channel {} of guild {}",
                channel_name, guild_name
            ),
        }
    }
}

/// Content-derived value that the outbound sender and the inbound callback
/// both compute from the same logical message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

const FILE_FINGERPRINT_PREFIX: &str = "file:";

impl Fingerprint {
    pub fn text(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    pub fn file(filename: &str) -> Self {
        Self(format!("{}{}", FILE_FINGERPRINT_PREFIX, filename))
    }

    pub fn is_text(&self) -> bool {
        !self.0.starts_with(FILE_FINGERPRINT_PREFIX)
    }

    /// Marker for sends without text, such as image embeds.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// The first attachment wins over the text content.
    pub fn of_remote(message: &RemoteMessage) -> Self {
        match message.attachments.first() {
            Some(attachment) => Self::file(&attachment.name),
            None => Self::text(message.content.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    #[default]
    Default,
    /// Joins, pins, boosts and other network-generated notices.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// A message as reported by the remote network's event callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    pub id: String,
    pub conversation: Conversation,
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embed_count: usize,
    /// Set when the message was posted through a relay identity (webhook).
    #[serde(default)]
    pub relay_identity: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub kind: MessageKind,
}

/// Local-network user a relayed message should appear to come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySender {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A local text event heading to the remote network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMessage {
    pub event_id: String,
    pub body: String,
    #[serde(default)]
    pub formatted_body: Option<String>,
    #[serde(default)]
    pub relay_as: Option<RelaySender>,
}

/// A local file event heading to the remote network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub event_id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub relay_as: Option<RelaySender>,
}

impl LocalFile {
    pub fn is_image(&self) -> bool {
        self.mimetype
            .as_deref()
            .and_then(|m| m.split('/').next())
            .map(|major| major == "image")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingContent {
    #[serde(rename_all = "camelCase")]
    Text {
        body: String,
        reply_to: Option<String>,
    },
    Attachment {
        filename: String,
        url: String,
    },
    ImageEmbed {
        title: String,
        url: String,
    },
}

/// What the pipeline hands to the network client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: OutgoingContent,
    pub relay_as: Option<RelaySender>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>, relay_as: Option<RelaySender>) -> Self {
        Self {
            content: OutgoingContent::Text {
                body: body.into(),
                reply_to: None,
            },
            relay_as,
        }
    }

    /// Value the echo of this message will carry.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.content {
            OutgoingContent::Text { body, .. } => Fingerprint::text(body.clone()),
            OutgoingContent::Attachment { filename, .. } => Fingerprint::file(filename),
            OutgoingContent::ImageEmbed { .. } => Fingerprint::empty(),
        }
    }
}

/// Translated content delivered into the local network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalContent {
    pub body: String,
    #[serde(default)]
    pub formatted_body: Option<String>,
    #[serde(default)]
    pub emote: bool,
    #[serde(default)]
    pub notice: bool,
}

/// Where an inbound event came from, as passed to the local delivery hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrigin {
    pub account: String,
    pub conversation: Conversation,
    pub author_id: String,
    pub event_id: String,
}

impl RemoteOrigin {
    pub fn of(account: &str, message: &RemoteMessage) -> Self {
        Self {
            account: account.to_string(),
            conversation: message.conversation.clone(),
            author_id: message.author_id.clone(),
            event_id: message.id.clone(),
        }
    }

    /// Origin of a reaction: `author_id` is the reacting user and
    /// `event_id` the message reacted to.
    pub fn of_reaction(account: &str, reaction: &RemoteReaction) -> Self {
        Self {
            account: account.to_string(),
            conversation: reaction.conversation.clone(),
            author_id: reaction.user_id.clone(),
            event_id: reaction.message_id.clone(),
        }
    }
}

/// A reaction added to or removed from a remote message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReaction {
    pub conversation: Conversation,
    /// Remote id of the message reacted to.
    pub message_id: String,
    /// Who reacted.
    pub user_id: String,
    /// Unicode emoji, or the name of a custom emoji.
    pub emoji: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, attachments: Vec<Attachment>) -> RemoteMessage {
        RemoteMessage {
            id: "1".to_string(),
            conversation: Conversation::direct("dm-1", "bob"),
            author_id: "alice".to_string(),
            content: content.to_string(),
            attachments,
            embed_count: 0,
            relay_identity: None,
            reply_to: None,
            kind: MessageKind::Default,
        }
    }

    #[test]
    fn remote_fingerprint_prefers_first_attachment() {
        let msg = message(
            "caption",
            vec![
                Attachment {
                    name: "cat.png".to_string(),
                    url: "https://cdn/cat.png".to_string(),
                },
                Attachment {
                    name: "dog.png".to_string(),
                    url: "https://cdn/dog.png".to_string(),
                },
            ],
        );
        assert_eq!(Fingerprint::of_remote(&msg).as_str(), "file:cat.png");
        assert_eq!(Fingerprint::of_remote(&message("hi", vec![])).as_str(), "hi");
    }

    #[test]
    fn outgoing_and_remote_fingerprints_agree() {
        let outgoing = OutgoingMessage {
            content: OutgoingContent::Attachment {
                filename: "cat.png".to_string(),
                url: "mxc://cat".to_string(),
            },
            relay_as: None,
        };
        let echo = message(
            "",
            vec![Attachment {
                name: "cat.png".to_string(),
                url: "https://cdn/cat.png".to_string(),
            }],
        );
        assert_eq!(outgoing.fingerprint(), Fingerprint::of_remote(&echo));
    }

    #[test]
    fn failure_notice_names_group_by_members_when_unnamed() {
        let conversation = Conversation {
            id: "g".to_string(),
            kind: ConversationKind::GroupMessage {
                name: None,
                recipients: vec!["ann".to_string(), "ben".to_string()],
            },
        };
        assert_eq!(
            conversation.send_failure_notice(),
            "Failed to send message into Group DM ann, ben"
        );
    }

    #[test]
    fn conversation_key_display_matches_lock_key_format() {
        assert_eq!(ConversationKey::new("3", "chan").to_string(), "3;chan");
    }

    #[test]
    fn image_detection_uses_major_mime_type() {
        let mut file = LocalFile {
            event_id: "$e".to_string(),
            filename: "a".to_string(),
            url: "mxc://a".to_string(),
            mimetype: Some("image/png".to_string()),
            size: None,
            relay_as: None,
        };
        assert!(file.is_image());
        file.mimetype = Some("video/mp4".to_string());
        assert!(!file.is_image());
        file.mimetype = None;
        assert!(!file.is_image());
    }
}
