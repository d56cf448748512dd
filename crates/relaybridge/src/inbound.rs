use crate::{
    BridgeCore, BridgingFlags, ConversationKey, Fingerprint, LocalDelivery, MessageKind,
    MessageTranslator, RemoteMessage, RemoteNetwork, RemoteOrigin, RemoteReaction, Result,
    SessionHandle,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Why an inbound event was recognized as this process's own echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EchoKind {
    /// Delete confirmation for a message we deleted.
    Deletion,
    /// Posted through our own relay identity.
    RelayIdentity,
    /// Bot account's own embed-only message.
    OwnEmbed,
    /// Matched an outgoing send in the ledger.
    Ledger,
    /// A reaction made by the linked account itself.
    OwnReaction,
}

/// Why an inbound event was ignored without being an echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    AccountNotLinked,
    SystemMessage,
    Unchanged,
    NotBridged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum InboundOutcome {
    Suppressed(EchoKind),
    Dropped(DropReason),
    Forwarded,
    /// Handling failed; the error was logged and nothing else is affected.
    Failed(String),
}

pub struct InboundFilterOptions {
    pub core: Arc<BridgeCore>,
    pub network: Arc<dyn RemoteNetwork>,
    pub flags: Arc<dyn BridgingFlags>,
    pub delivery: Arc<dyn LocalDelivery>,
    pub translator: Arc<dyn MessageTranslator>,
}

/// Decides, for every event the remote network reports, whether it is an
/// echo of our own activity or something to forward to the local network.
///
/// Checks run cheapest and most certain first: our own deletes, our own
/// relay identity, the dedup ledger, then the bridging flags.
pub struct InboundFilter {
    core: Arc<BridgeCore>,
    network: Arc<dyn RemoteNetwork>,
    flags: Arc<dyn BridgingFlags>,
    delivery: Arc<dyn LocalDelivery>,
    translator: Arc<dyn MessageTranslator>,
}

impl InboundFilter {
    pub fn new(options: InboundFilterOptions) -> Self {
        Self {
            core: options.core,
            network: options.network,
            flags: options.flags,
            delivery: options.delivery,
            translator: options.translator,
        }
    }

    pub async fn on_message_created(&self, account: &str, message: &RemoteMessage) -> InboundOutcome {
        let outcome = self.message_created(account, message).await;
        self.finish("create", account, &message.conversation.id, &message.id, outcome)
    }

    /// `before` is `None` when the network could not supply the previous
    /// version of the message.
    pub async fn on_message_updated(
        &self,
        account: &str,
        before: Option<&RemoteMessage>,
        after: &RemoteMessage,
    ) -> InboundOutcome {
        let outcome = self.message_updated(account, before, after).await;
        self.finish("update", account, &after.conversation.id, &after.id, outcome)
    }

    pub async fn on_message_deleted(&self, account: &str, message: &RemoteMessage) -> InboundOutcome {
        let outcome = self.message_deleted(account, message).await;
        self.finish("delete", account, &message.conversation.id, &message.id, outcome)
    }

    /// Handles each message of a bulk delete on its own; a failure is
    /// reported in that message's outcome and the rest still run.
    pub async fn on_messages_deleted(
        &self,
        account: &str,
        messages: &[RemoteMessage],
    ) -> Vec<InboundOutcome> {
        debug!(account, count = messages.len(), "bulk delete");
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.on_message_deleted(account, message).await);
        }
        outcomes
    }

    pub async fn on_reaction_added(&self, account: &str, reaction: &RemoteReaction) -> InboundOutcome {
        let outcome = self.reaction_changed(account, reaction, true).await;
        self.finish(
            "reactionAdd",
            account,
            &reaction.conversation.id,
            &reaction.message_id,
            outcome,
        )
    }

    pub async fn on_reaction_removed(&self, account: &str, reaction: &RemoteReaction) -> InboundOutcome {
        let outcome = self.reaction_changed(account, reaction, false).await;
        self.finish(
            "reactionRemove",
            account,
            &reaction.conversation.id,
            &reaction.message_id,
            outcome,
        )
    }

    /// Every reaction was removed from `message`.
    pub async fn on_reactions_cleared(&self, account: &str, message: &RemoteMessage) -> InboundOutcome {
        let outcome = self.reactions_cleared(account, message).await;
        self.finish(
            "reactionRemoveAll",
            account,
            &message.conversation.id,
            &message.id,
            outcome,
        )
    }

    fn finish(
        &self,
        event: &str,
        account: &str,
        conversation_id: &str,
        remote_event_id: &str,
        outcome: Result<InboundOutcome>,
    ) -> InboundOutcome {
        match outcome {
            Ok(outcome) => {
                debug!(
                    account,
                    conversation = conversation_id,
                    remote_event_id,
                    event,
                    ?outcome,
                    "inbound event handled"
                );
                outcome
            }
            Err(e) => {
                error!(
                    account,
                    conversation = conversation_id,
                    remote_event_id,
                    event,
                    error = %e,
                    "failed to handle inbound event"
                );
                InboundOutcome::Failed(e.to_string())
            }
        }
    }

    async fn message_created(&self, account: &str, message: &RemoteMessage) -> Result<InboundOutcome> {
        let Some(session) = self.core.sessions.get(account) else {
            return Ok(InboundOutcome::Dropped(DropReason::AccountNotLinked));
        };
        if message.kind == MessageKind::System {
            return Ok(InboundOutcome::Dropped(DropReason::SystemMessage));
        }
        let key = ConversationKey::new(account, &message.conversation.id);
        if let Some(outcome) = self.screen(&session, &key, message, false).await? {
            return Ok(outcome);
        }

        self.core.last_events.set(&key, &message.id);
        let origin = RemoteOrigin::of(account, message);
        if !message.content.is_empty() || message.embed_count > 0 {
            let content = self.translator.to_local(message)?;
            match &message.reply_to {
                Some(reply_to) => {
                    self.delivery
                        .deliver_reply(&origin, reply_to, content)
                        .await?
                }
                None => self.delivery.deliver_message(&origin, content).await?,
            }
        }
        for attachment in &message.attachments {
            self.delivery.deliver_file(&origin, attachment).await?;
        }
        Ok(InboundOutcome::Forwarded)
    }

    async fn message_updated(
        &self,
        account: &str,
        before: Option<&RemoteMessage>,
        after: &RemoteMessage,
    ) -> Result<InboundOutcome> {
        let Some(session) = self.core.sessions.get(account) else {
            return Ok(InboundOutcome::Dropped(DropReason::AccountNotLinked));
        };
        if before.is_some_and(|before| before.content == after.content) {
            return Ok(InboundOutcome::Dropped(DropReason::Unchanged));
        }
        let key = ConversationKey::new(account, &after.conversation.id);
        if let Some(outcome) = self.screen(&session, &key, after, false).await? {
            return Ok(outcome);
        }

        let origin = RemoteOrigin::of(account, after);
        let content = self.translator.to_local(after)?;
        // An update that adds text to a previously empty message reads as a
        // new message on the local side.
        if before.is_some_and(|before| before.content.is_empty()) {
            self.delivery.deliver_message(&origin, content).await?;
        } else {
            self.delivery.deliver_edit(&origin, content).await?;
        }
        Ok(InboundOutcome::Forwarded)
    }

    async fn message_deleted(&self, account: &str, message: &RemoteMessage) -> Result<InboundOutcome> {
        let Some(session) = self.core.sessions.get(account) else {
            return Ok(InboundOutcome::Dropped(DropReason::AccountNotLinked));
        };
        let key = ConversationKey::new(account, &message.conversation.id);
        if let Some(outcome) = self.screen(&session, &key, message, true).await? {
            return Ok(outcome);
        }

        self.delivery
            .deliver_redact(&RemoteOrigin::of(account, message))
            .await?;
        Ok(InboundOutcome::Forwarded)
    }

    async fn reaction_changed(
        &self,
        account: &str,
        reaction: &RemoteReaction,
        added: bool,
    ) -> Result<InboundOutcome> {
        let Some(session) = self.core.sessions.get(account) else {
            return Ok(InboundOutcome::Dropped(DropReason::AccountNotLinked));
        };
        // Reactions we send come back from the network as the account's own.
        if reaction.user_id == session.user_id {
            return Ok(InboundOutcome::Suppressed(EchoKind::OwnReaction));
        }
        if !self
            .flags
            .is_conversation_bridged(account, &reaction.conversation)
            .await?
        {
            return Ok(InboundOutcome::Dropped(DropReason::NotBridged));
        }

        let origin = RemoteOrigin::of_reaction(account, reaction);
        if added {
            self.delivery.deliver_reaction(&origin, &reaction.emoji).await?;
        } else {
            self.delivery
                .deliver_reaction_removed(&origin, &reaction.emoji)
                .await?;
        }
        Ok(InboundOutcome::Forwarded)
    }

    async fn reactions_cleared(&self, account: &str, message: &RemoteMessage) -> Result<InboundOutcome> {
        if self.core.sessions.get(account).is_none() {
            return Ok(InboundOutcome::Dropped(DropReason::AccountNotLinked));
        }
        if !self
            .flags
            .is_conversation_bridged(account, &message.conversation)
            .await?
        {
            return Ok(InboundOutcome::Dropped(DropReason::NotBridged));
        }

        self.delivery
            .deliver_reactions_cleared(&RemoteOrigin::of(account, message))
            .await?;
        Ok(InboundOutcome::Forwarded)
    }

    /// Shared echo and bridging checks. Returns the outcome when the event
    /// must not be forwarded.
    async fn screen(
        &self,
        session: &SessionHandle,
        key: &ConversationKey,
        message: &RemoteMessage,
        is_delete: bool,
    ) -> Result<Option<InboundOutcome>> {
        if is_delete && self.core.deleted.take(key, &message.id) {
            return Ok(Some(InboundOutcome::Suppressed(EchoKind::Deletion)));
        }

        if let Some(relay) = &message.relay_identity {
            let ours = self
                .network
                .relay_identity(&session.account, &message.conversation)
                .await?;
            if ours.as_deref() == Some(relay.as_str()) {
                return Ok(Some(InboundOutcome::Suppressed(EchoKind::RelayIdentity)));
            }
        }

        if session.is_bot
            && message.author_id == session.user_id
            && message.content.is_empty()
            && message.embed_count > 0
        {
            return Ok(Some(InboundOutcome::Suppressed(EchoKind::OwnEmbed)));
        }

        if self.core.ledger.try_consume_echo(
            key,
            &message.author_id,
            &message.id,
            &Fingerprint::of_remote(message),
        ) {
            return Ok(Some(InboundOutcome::Suppressed(EchoKind::Ledger)));
        }

        if !self
            .flags
            .is_conversation_bridged(&session.account, &message.conversation)
            .await?
        {
            return Ok(Some(InboundOutcome::Dropped(DropReason::NotBridged)));
        }

        Ok(None)
    }
}
