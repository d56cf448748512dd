use crate::{
    BridgeConfig, BridgingFlags, DedupeLedger, EventIdentityStore, InboundFilter,
    InboundFilterOptions, InboundOutcome, LastEventIds, LocalDelivery, LocalFile, LocalMessage,
    MessageTranslator, OutboundPipeline, OutboundPipelineOptions, PlainTextTranslator,
    RecentlyDeletedSet, RelaySender, RemoteMessage, RemoteNetwork, RemoteReaction, Result,
    SendSerializer, SessionHandle, SessionRegistry,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// In-process state shared by the inbound filter and the outbound pipeline.
pub struct BridgeCore {
    pub config: BridgeConfig,
    pub sessions: SessionRegistry,
    pub ledger: DedupeLedger,
    pub serializer: SendSerializer,
    pub deleted: RecentlyDeletedSet,
    pub last_events: LastEventIds,
}

impl BridgeCore {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            ledger: DedupeLedger::new(config.echo_ttl()),
            serializer: SendSerializer::new(config.lock_timeout()),
            deleted: RecentlyDeletedSet::new(config.deleted_window()),
            last_events: LastEventIds::new(),
            config,
        }
    }
}

pub struct BridgeOptions {
    pub config: BridgeConfig,
    pub network: Arc<dyn RemoteNetwork>,
    pub delivery: Arc<dyn LocalDelivery>,
    pub store: Arc<dyn EventIdentityStore>,
    pub flags: Arc<dyn BridgingFlags>,
    /// Defaults to [`PlainTextTranslator`].
    pub translator: Option<Arc<dyn MessageTranslator>>,
}

/// Result of a local event handled at the bridge boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum OutboundOutcome {
    /// Remote ids the event became.
    Sent(Vec<String>),
    Deleted,
    Reacted,
    Skipped,
    /// The error was logged, and reported to the conversation where that
    /// applies.
    Failed(String),
}

/// Entry point wiring both directions of the bridge together.
///
/// Handlers never return errors: every failure is logged here and turned
/// into a `Failed` outcome, so one bad event cannot take down the caller's
/// event loop.
pub struct Bridge {
    core: Arc<BridgeCore>,
    inbound: InboundFilter,
    outbound: OutboundPipeline,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        let core = Arc::new(BridgeCore::new(options.config));
        let translator = options
            .translator
            .unwrap_or_else(|| Arc::new(PlainTextTranslator));

        let inbound = InboundFilter::new(InboundFilterOptions {
            core: core.clone(),
            network: options.network.clone(),
            flags: options.flags,
            delivery: options.delivery.clone(),
            translator: translator.clone(),
        });
        let outbound = OutboundPipeline::new(OutboundPipelineOptions {
            core: core.clone(),
            network: options.network,
            delivery: options.delivery,
            store: options.store,
            translator,
        });

        Self {
            core,
            inbound,
            outbound,
        }
    }

    pub fn core(&self) -> &BridgeCore {
        &self.core
    }

    pub fn link(&self, session: SessionHandle) {
        if let Some(previous) = self.core.sessions.link(session) {
            info!(account = %previous.account, "replaced existing session");
        }
    }

    pub fn unlink(&self, account: &str) -> bool {
        self.core.last_events.forget_account(account);
        self.core.sessions.unlink(account).is_some()
    }

    /// Drops expired dedup registrations. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.core.ledger.sweep()
    }

    pub async fn on_remote_created(&self, account: &str, message: &RemoteMessage) -> InboundOutcome {
        self.inbound.on_message_created(account, message).await
    }

    pub async fn on_remote_updated(
        &self,
        account: &str,
        before: Option<&RemoteMessage>,
        after: &RemoteMessage,
    ) -> InboundOutcome {
        self.inbound.on_message_updated(account, before, after).await
    }

    pub async fn on_remote_deleted(&self, account: &str, message: &RemoteMessage) -> InboundOutcome {
        self.inbound.on_message_deleted(account, message).await
    }

    pub async fn on_remote_deleted_bulk(
        &self,
        account: &str,
        messages: &[RemoteMessage],
    ) -> Vec<InboundOutcome> {
        self.inbound.on_messages_deleted(account, messages).await
    }

    pub async fn on_remote_reaction_added(
        &self,
        account: &str,
        reaction: &RemoteReaction,
    ) -> InboundOutcome {
        self.inbound.on_reaction_added(account, reaction).await
    }

    pub async fn on_remote_reaction_removed(
        &self,
        account: &str,
        reaction: &RemoteReaction,
    ) -> InboundOutcome {
        self.inbound.on_reaction_removed(account, reaction).await
    }

    pub async fn on_remote_reactions_cleared(
        &self,
        account: &str,
        message: &RemoteMessage,
    ) -> InboundOutcome {
        self.inbound.on_reactions_cleared(account, message).await
    }

    pub async fn on_local_message(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
    ) -> OutboundOutcome {
        let result = self
            .outbound
            .send_message(account, conversation_id, message)
            .await;
        sent("message", account, conversation_id, result)
    }

    pub async fn on_local_reply(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
        reply_to_remote_id: &str,
    ) -> OutboundOutcome {
        let result = self
            .outbound
            .reply(account, conversation_id, message, reply_to_remote_id)
            .await;
        sent("reply", account, conversation_id, result)
    }

    pub async fn on_local_file(
        &self,
        account: &str,
        conversation_id: &str,
        file: &LocalFile,
    ) -> OutboundOutcome {
        let result = self
            .outbound
            .send_file(account, conversation_id, file)
            .await;
        sent("file", account, conversation_id, result)
    }

    pub async fn on_local_edit(
        &self,
        account: &str,
        conversation_id: &str,
        message: &LocalMessage,
        target_remote_id: &str,
    ) -> OutboundOutcome {
        let result = self
            .outbound
            .edit(account, conversation_id, message, target_remote_id)
            .await;
        sent("edit", account, conversation_id, result)
    }

    pub async fn on_local_redact(
        &self,
        account: &str,
        conversation_id: &str,
        target_remote_id: &str,
    ) -> OutboundOutcome {
        match self
            .outbound
            .delete(account, conversation_id, target_remote_id)
            .await
        {
            Ok(()) => OutboundOutcome::Deleted,
            Err(e) => failed("redact", account, conversation_id, e),
        }
    }

    pub async fn on_local_reaction(
        &self,
        account: &str,
        conversation_id: &str,
        target_remote_id: &str,
        reaction: &str,
        relay_as: Option<&RelaySender>,
    ) -> OutboundOutcome {
        match self
            .outbound
            .react(account, conversation_id, target_remote_id, reaction, relay_as)
            .await
        {
            Ok(true) => OutboundOutcome::Reacted,
            Ok(false) => OutboundOutcome::Skipped,
            Err(e) => failed("reaction", account, conversation_id, e),
        }
    }
}

fn sent(event: &str, account: &str, conversation_id: &str, result: Result<Vec<String>>) -> OutboundOutcome {
    match result {
        Ok(ids) => OutboundOutcome::Sent(ids),
        Err(e) => failed(event, account, conversation_id, e),
    }
}

fn failed(event: &str, account: &str, conversation_id: &str, e: crate::Error) -> OutboundOutcome {
    if e.is_user_visible() {
        warn!(account, conversation = conversation_id, event, error = %e, "local event not bridged");
    } else {
        error!(account, conversation = conversation_id, event, error = %e, "failed to handle local event");
    }
    OutboundOutcome::Failed(e.to_string())
}
