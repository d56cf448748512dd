use crate::{Attachment, Error, LocalContent, RemoteOrigin, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Hook into the local network, used to deliver remote events that passed
/// the inbound filter and to post status notices.
#[async_trait]
pub trait LocalDelivery: Send + Sync {
    async fn deliver_message(&self, origin: &RemoteOrigin, content: LocalContent) -> Result<()>;

    async fn deliver_reply(
        &self,
        origin: &RemoteOrigin,
        reply_to: &str,
        content: LocalContent,
    ) -> Result<()>;

    /// `origin.event_id` is the remote id of the message being edited.
    async fn deliver_edit(&self, origin: &RemoteOrigin, content: LocalContent) -> Result<()>;

    /// `origin.event_id` is the remote id of the deleted message.
    async fn deliver_redact(&self, origin: &RemoteOrigin) -> Result<()>;

    async fn deliver_file(&self, origin: &RemoteOrigin, attachment: &Attachment) -> Result<()>;

    /// `origin.event_id` is the remote id of the message reacted to and
    /// `origin.author_id` the reacting user.
    async fn deliver_reaction(&self, origin: &RemoteOrigin, emoji: &str) -> Result<()>;

    async fn deliver_reaction_removed(&self, origin: &RemoteOrigin, emoji: &str) -> Result<()>;

    async fn deliver_reactions_cleared(&self, origin: &RemoteOrigin) -> Result<()>;

    async fn status_notice(&self, account: &str, conversation_id: &str, text: &str) -> Result<()>;
}

/// Everything a [`ChannelDelivery`] was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeliveryEvent {
    Message {
        origin: RemoteOrigin,
        content: LocalContent,
    },
    #[serde(rename_all = "camelCase")]
    Reply {
        origin: RemoteOrigin,
        reply_to: String,
        content: LocalContent,
    },
    Edit {
        origin: RemoteOrigin,
        content: LocalContent,
    },
    Redact {
        origin: RemoteOrigin,
    },
    File {
        origin: RemoteOrigin,
        attachment: Attachment,
    },
    Reaction {
        origin: RemoteOrigin,
        emoji: String,
    },
    ReactionRemoved {
        origin: RemoteOrigin,
        emoji: String,
    },
    ReactionsCleared {
        origin: RemoteOrigin,
    },
    #[serde(rename_all = "camelCase")]
    StatusNotice {
        account: String,
        conversation_id: String,
        text: String,
    },
}

/// [`LocalDelivery`] that forwards every call as a [`DeliveryEvent`] on a
/// channel, leaving the actual posting to the receiver.
pub struct ChannelDelivery {
    event_tx: crossbeam_channel::Sender<DeliveryEvent>,
}

impl ChannelDelivery {
    pub fn new(event_tx: crossbeam_channel::Sender<DeliveryEvent>) -> Self {
        Self { event_tx }
    }

    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<DeliveryEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn emit(&self, event: DeliveryEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| Error::Delivery("Delivery channel closed".to_string()))
    }
}

#[async_trait]
impl LocalDelivery for ChannelDelivery {
    async fn deliver_message(&self, origin: &RemoteOrigin, content: LocalContent) -> Result<()> {
        self.emit(DeliveryEvent::Message {
            origin: origin.clone(),
            content,
        })
    }

    async fn deliver_reply(
        &self,
        origin: &RemoteOrigin,
        reply_to: &str,
        content: LocalContent,
    ) -> Result<()> {
        self.emit(DeliveryEvent::Reply {
            origin: origin.clone(),
            reply_to: reply_to.to_string(),
            content,
        })
    }

    async fn deliver_edit(&self, origin: &RemoteOrigin, content: LocalContent) -> Result<()> {
        self.emit(DeliveryEvent::Edit {
            origin: origin.clone(),
            content,
        })
    }

    async fn deliver_redact(&self, origin: &RemoteOrigin) -> Result<()> {
        self.emit(DeliveryEvent::Redact {
            origin: origin.clone(),
        })
    }

    async fn deliver_file(&self, origin: &RemoteOrigin, attachment: &Attachment) -> Result<()> {
        self.emit(DeliveryEvent::File {
            origin: origin.clone(),
            attachment: attachment.clone(),
        })
    }

    async fn deliver_reaction(&self, origin: &RemoteOrigin, emoji: &str) -> Result<()> {
        self.emit(DeliveryEvent::Reaction {
            origin: origin.clone(),
            emoji: emoji.to_string(),
        })
    }

    async fn deliver_reaction_removed(&self, origin: &RemoteOrigin, emoji: &str) -> Result<()> {
        self.emit(DeliveryEvent::ReactionRemoved {
            origin: origin.clone(),
            emoji: emoji.to_string(),
        })
    }

    async fn deliver_reactions_cleared(&self, origin: &RemoteOrigin) -> Result<()> {
        self.emit(DeliveryEvent::ReactionsCleared {
            origin: origin.clone(),
        })
    }

    async fn status_notice(&self, account: &str, conversation_id: &str, text: &str) -> Result<()> {
        self.emit(DeliveryEvent::StatusNotice {
            account: account.to_string(),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
        })
    }
}
