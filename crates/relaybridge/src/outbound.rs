use crate::{
    BridgeCore, Conversation, ConversationKey, Error, EventIdentityStore, Fingerprint,
    LocalDelivery, LocalFile, LocalMessage, MessageTranslator, OutgoingContent, OutgoingMessage,
    RelaySender, RemoteNetwork, Result, SessionHandle,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct OutboundPipelineOptions {
    pub core: Arc<BridgeCore>,
    pub network: Arc<dyn RemoteNetwork>,
    pub delivery: Arc<dyn LocalDelivery>,
    pub store: Arc<dyn EventIdentityStore>,
    pub translator: Arc<dyn MessageTranslator>,
}

/// Where a local event is headed, resolved once per operation.
struct Target {
    session: SessionHandle,
    conversation: Conversation,
    key: ConversationKey,
}

/// Sends local events into the remote network.
///
/// Every send holds the conversation's send lock and is registered in the
/// dedup ledger before the network call, so the inbound filter recognizes
/// the echo whether it arrives before or after the call returns.
pub struct OutboundPipeline {
    core: Arc<BridgeCore>,
    network: Arc<dyn RemoteNetwork>,
    delivery: Arc<dyn LocalDelivery>,
    store: Arc<dyn EventIdentityStore>,
    translator: Arc<dyn MessageTranslator>,
}

impl OutboundPipeline {
    pub fn new(options: OutboundPipelineOptions) -> Self {
        Self {
            core: options.core,
            network: options.network,
            delivery: options.delivery,
            store: options.store,
            translator: options.translator,
        }
    }

    /// Returns the remote ids the message became.
    pub async fn send_message(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
    ) -> Result<Vec<String>> {
        let target = self.resolve(account, conversation_id).await?;
        let body = self.translator.to_remote(message)?;
        let outgoing = OutgoingMessage::text(body, message.relay_as.clone());
        self.send_or_notify(&target, &message.event_id, outgoing)
            .await
    }

    pub async fn reply(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
        reply_to_remote_id: &str,
    ) -> Result<Vec<String>> {
        let target = self.resolve(account, conversation_id).await?;
        let body = self.translator.to_remote(message)?;
        let outgoing = OutgoingMessage {
            content: OutgoingContent::Text {
                body,
                reply_to: Some(reply_to_remote_id.to_string()),
            },
            relay_as: message.relay_as.clone(),
        };
        self.send_or_notify(&target, &message.event_id, outgoing)
            .await
    }

    /// Uploads the file when it fits the network's limit, and falls back to
    /// an image embed (bots only) or a link when the upload is too large or
    /// rejected.
    pub async fn send_file(
        &self,
        account: &str,
        conversation_id: &str,
        file: &LocalFile,
    ) -> Result<Vec<String>> {
        let target = self.resolve(account, conversation_id).await?;

        if file.size.unwrap_or(0) < self.core.config.max_upload_bytes {
            let upload = OutgoingMessage {
                content: OutgoingContent::Attachment {
                    filename: file.filename.clone(),
                    url: file.url.clone(),
                },
                relay_as: file.relay_as.clone(),
            };
            match self.send_locked(&target, &file.event_id, upload).await {
                Ok(ids) => return Ok(ids),
                Err(e) => warn!(
                    conversation = %target.key,
                    filename = %file.filename,
                    error = %e,
                    "couldn't upload file, sending a link instead"
                ),
            }
        }

        let content = if file.is_image() && target.session.is_bot {
            OutgoingContent::ImageEmbed {
                title: file.filename.clone(),
                url: file.url.clone(),
            }
        } else {
            OutgoingContent::Text {
                body: format!("Uploaded a file `{}`: {}", file.filename, file.url),
                reply_to: None,
            }
        };
        let fallback = OutgoingMessage {
            content,
            relay_as: file.relay_as.clone(),
        };
        self.send_or_notify(&target, &file.event_id, fallback).await
    }

    /// Edits `target_remote_id` to carry `message`.
    ///
    /// Relayed messages cannot be edited in place. If the target is still the
    /// newest message in the conversation it is deleted and re-sent,
    /// otherwise the new text is sent with the edit prefix.
    pub async fn edit(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
        target_remote_id: &str,
    ) -> Result<Vec<String>> {
        let target = self.resolve(account, conversation_id).await?;
        let body = self.translator.to_remote(message)?;

        let result = if message.relay_as.is_some() {
            self.relayed_edit(&target, message, target_remote_id, body)
                .await
        } else {
            let fingerprint = Fingerprint::text(body.clone());
            self.locked(&target, &message.event_id, fingerprint, || {
                self.network.edit(
                    &target.session.account,
                    &target.conversation,
                    target_remote_id,
                    &body,
                )
            })
            .await
        };
        match result {
            Ok(ids) => Ok(ids),
            Err(e) => Err(self.report_failure(&target, e).await),
        }
    }

    async fn relayed_edit(
        &self,
        target: &Target,
        message: &LocalMessage,
        target_remote_id: &str,
        body: String,
    ) -> Result<Vec<String>> {
        if !self.core.last_events.is_last(&target.key, target_remote_id) {
            let outgoing = OutgoingMessage::text(
                format!("{}{}", self.core.config.edit_prefix, body),
                message.relay_as.clone(),
            );
            return self
                .send_locked(target, &message.event_id, outgoing)
                .await;
        }

        // The re-sent message stands in for the original local event.
        let local_event_id = match self
            .store
            .get_local_ids(&target.session.account, target_remote_id)
            .await
        {
            Ok(ids) => ids
                .into_iter()
                .next()
                .unwrap_or_else(|| message.event_id.clone()),
            Err(e) => {
                warn!(conversation = %target.key, error = %e, "failed to look up edited event");
                message.event_id.clone()
            }
        };

        let outgoing = OutgoingMessage::text(body, message.relay_as.clone());
        let fingerprint = outgoing.fingerprint();
        self.locked(target, &local_event_id, fingerprint, || async {
            self.core.deleted.insert(&target.key, target_remote_id);
            if let Err(e) = self
                .network
                .delete(&target.session.account, &target.conversation, target_remote_id)
                .await
            {
                warn!(conversation = %target.key, error = %e, "couldn't delete message being replaced");
            }
            self.forget(target, target_remote_id).await;
            self.network
                .send(&target.session.account, &target.conversation, &outgoing)
                .await
        })
        .await
    }

    pub async fn delete(
        &self,
        account: &str,
        conversation_id: &str,
        target_remote_id: &str,
    ) -> Result<()> {
        let target = self.resolve(account, conversation_id).await?;

        let ticket = self.core.serializer.acquire(&target.key).await;
        self.core.deleted.insert(&target.key, target_remote_id);
        let result = self
            .network
            .delete(&target.session.account, &target.conversation, target_remote_id)
            .await;
        if result.is_ok() {
            self.forget(&target, target_remote_id).await;
        }
        self.core.serializer.release_ticket(&ticket);

        result.map_err(|e| {
            warn!(conversation = %target.key, remote_event_id = target_remote_id, error = %e, "couldn't delete message");
            Error::Network(e.to_string())
        })
    }

    /// Reactions from relayed users are dropped; the relay identity cannot
    /// react on their behalf.
    pub async fn react(
        &self,
        account: &str,
        conversation_id: &str,
        target_remote_id: &str,
        reaction: &str,
        relay_as: Option<&RelaySender>,
    ) -> Result<bool> {
        if relay_as.is_some() {
            debug!(account, conversation = conversation_id, "ignoring relayed reaction");
            return Ok(false);
        }
        let target = self.resolve(account, conversation_id).await?;
        self.network
            .react(
                &target.session.account,
                &target.conversation,
                target_remote_id,
                reaction,
            )
            .await
            .map_err(|e| {
                warn!(conversation = %target.key, error = %e, "couldn't add reaction");
                Error::Network(e.to_string())
            })?;
        Ok(true)
    }

    async fn resolve(&self, account: &str, conversation_id: &str) -> Result<Target> {
        let session = self
            .core
            .sessions
            .get(account)
            .ok_or_else(|| Error::AccountNotLinked(account.to_string()))?;

        match self
            .network
            .resolve_conversation(account, conversation_id)
            .await?
        {
            Some(conversation) => Ok(Target {
                key: ConversationKey::new(account, &conversation.id),
                session,
                conversation,
            }),
            None => {
                warn!(account, conversation = conversation_id, "channel not found");
                self.notice(account, conversation_id, "Channel not found")
                    .await;
                Err(Error::ChannelNotFound(conversation_id.to_string()))
            }
        }
    }

    async fn send_or_notify(
        &self,
        target: &Target,
        local_event_id: &str,
        message: OutgoingMessage,
    ) -> Result<Vec<String>> {
        match self.send_locked(target, local_event_id, message).await {
            Ok(ids) => Ok(ids),
            Err(e) => Err(self.report_failure(target, e).await),
        }
    }

    async fn send_locked(
        &self,
        target: &Target,
        local_event_id: &str,
        message: OutgoingMessage,
    ) -> Result<Vec<String>> {
        let fingerprint = message.fingerprint();
        self.locked(target, local_event_id, fingerprint, || {
            self.network
                .send(&target.session.account, &target.conversation, &message)
        })
        .await
    }

    /// Runs `call` while holding the conversation's send lock, with the
    /// outgoing event registered in the ledger. On success the ids are
    /// recorded before the lock is released; on failure only the lock is
    /// released and the registration is left to expire.
    async fn locked<F, Fut>(
        &self,
        target: &Target,
        local_event_id: &str,
        fingerprint: Fingerprint,
        call: F,
    ) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        let ticket = self.core.serializer.acquire(&target.key).await;
        let token =
            self.core
                .ledger
                .register_outgoing(&target.key, &target.session.user_id, fingerprint);

        match call().await {
            Ok(ids) => {
                self.record(target, local_event_id, &ids).await;
                self.core.ledger.release(&token, &ids);
                self.core.serializer.release_ticket(&ticket);
                Ok(ids)
            }
            Err(e) => {
                self.core.serializer.release_ticket(&ticket);
                Err(e)
            }
        }
    }

    async fn record(&self, target: &Target, local_event_id: &str, remote_ids: &[String]) {
        for remote_id in remote_ids {
            if let Err(e) = self
                .store
                .insert(&target.session.account, local_event_id, remote_id)
                .await
            {
                warn!(
                    conversation = %target.key,
                    local_event_id,
                    remote_event_id = %remote_id,
                    error = %e,
                    "failed to store event mapping"
                );
            }
        }
        if let Some(last) = remote_ids.last() {
            self.core.last_events.set(&target.key, last);
        }
    }

    async fn forget(&self, target: &Target, remote_id: &str) {
        if let Err(e) = self.store.remove(&target.session.account, remote_id).await {
            warn!(conversation = %target.key, remote_event_id = remote_id, error = %e, "failed to remove event mapping");
        }
    }

    async fn report_failure(&self, target: &Target, error: Error) -> Error {
        warn!(conversation = %target.key, error = %error, "couldn't send message");
        self.notice(
            &target.session.account,
            &target.conversation.id,
            &target.conversation.send_failure_notice(),
        )
        .await;
        Error::SendFailed(error.to_string())
    }

    async fn notice(&self, account: &str, conversation_id: &str, text: &str) {
        if let Err(e) = self
            .delivery
            .status_notice(account, conversation_id, text)
            .await
        {
            warn!(account, conversation = conversation_id, error = %e, "failed to post status notice");
        }
    }
}
