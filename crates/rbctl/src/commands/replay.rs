use anyhow::{Context, Result};
use relaybridge::simulated::{NetworkCall, SimulatedNetwork};
use relaybridge::{
    Bridge, BridgeConfig, BridgeOptions, ChannelDelivery, Conversation, DeliveryEvent,
    InMemoryStorage, KvBridgingFlags, KvEventIdentityStore, LocalFile, LocalMessage,
    RelaySender, RemoteMessage, RemoteNetwork, RemoteReaction, SessionHandle, StorageAdapter,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::output::{list_or_dash, to_json, Output, Report};

/// A scripted sequence of local and remote events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub accounts: Vec<SessionHandle>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    /// Conversations that get a relay identity (webhook).
    #[serde(default)]
    pub relay_identities: Vec<String>,
    /// Accounts that bridge every guild channel.
    #[serde(default)]
    pub bridge_all: Vec<String>,
    #[serde(default)]
    pub network: NetworkSettings,
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    #[serde(default)]
    pub split_len: Option<usize>,
    #[serde(default)]
    pub reject_uploads: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    LocalMessage {
        account: String,
        conversation: String,
        message: LocalMessage,
    },
    #[serde(rename_all = "camelCase")]
    LocalReply {
        account: String,
        conversation: String,
        message: LocalMessage,
        reply_to: String,
    },
    LocalFile {
        account: String,
        conversation: String,
        file: LocalFile,
    },
    LocalEdit {
        account: String,
        conversation: String,
        message: LocalMessage,
        target: String,
    },
    LocalRedact {
        account: String,
        conversation: String,
        target: String,
    },
    #[serde(rename_all = "camelCase")]
    LocalReaction {
        account: String,
        conversation: String,
        target: String,
        reaction: String,
        #[serde(default)]
        relay_as: Option<RelaySender>,
    },
    RemoteCreated {
        account: String,
        message: RemoteMessage,
    },
    RemoteUpdated {
        account: String,
        #[serde(default)]
        before: Option<RemoteMessage>,
        after: RemoteMessage,
    },
    RemoteDeleted {
        account: String,
        message: RemoteMessage,
    },
    RemoteDeletedBulk {
        account: String,
        messages: Vec<RemoteMessage>,
    },
    RemoteReactionAdded {
        account: String,
        reaction: RemoteReaction,
    },
    RemoteReactionRemoved {
        account: String,
        reaction: RemoteReaction,
    },
    RemoteReactionsCleared {
        account: String,
        message: RemoteMessage,
    },
    /// Feed the network's echo of the `send`-th send call (0-based) back in.
    Echo {
        account: String,
        send: usize,
    },
    /// Make the next `count` sends fail.
    FailNext {
        count: usize,
    },
    Wait {
        ms: u64,
    },
    Sweep,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::LocalMessage { .. } => "localMessage",
            Step::LocalReply { .. } => "localReply",
            Step::LocalFile { .. } => "localFile",
            Step::LocalEdit { .. } => "localEdit",
            Step::LocalRedact { .. } => "localRedact",
            Step::LocalReaction { .. } => "localReaction",
            Step::RemoteCreated { .. } => "remoteCreated",
            Step::RemoteUpdated { .. } => "remoteUpdated",
            Step::RemoteDeleted { .. } => "remoteDeleted",
            Step::RemoteDeletedBulk { .. } => "remoteDeletedBulk",
            Step::RemoteReactionAdded { .. } => "remoteReactionAdded",
            Step::RemoteReactionRemoved { .. } => "remoteReactionRemoved",
            Step::RemoteReactionsCleared { .. } => "remoteReactionsCleared",
            Step::Echo { .. } => "echo",
            Step::FailNext { .. } => "failNext",
            Step::Wait { .. } => "wait",
            Step::Sweep => "sweep",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub step: &'static str,
    pub outcome: serde_json::Value,
    pub deliveries: Vec<DeliveryEvent>,
}

impl Report for StepReport {
    fn human(&self) -> String {
        let mut line = format!("#{} {}: {}", self.index, self.step, to_json(&self.outcome));
        for delivery in &self.deliveries {
            line.push_str(&format!("\n      -> {}", to_json(delivery)));
        }
        line
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaySummary {
    steps: usize,
    network_calls: Vec<NetworkCall>,
}

impl Report for ReplaySummary {
    fn human(&self) -> String {
        let sent: Vec<String> = self
            .network_calls
            .iter()
            .filter_map(|call| match call {
                NetworkCall::Send { remote_ids, .. } => Some(remote_ids.join("+")),
                _ => None,
            })
            .collect();
        format!(
            "Replayed {} steps, {} network calls (sent: {})",
            self.steps,
            self.network_calls.len(),
            list_or_dash(&sent)
        )
    }
}

/// Replay a trace file
pub async fn run(path: &Path, config: &Config, output: &Output) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace {}", path.display()))?;
    let trace: Trace = serde_json::from_str(&content).context("Failed to parse trace")?;
    info!(path = %path.display(), steps = trace.steps.len(), "replaying trace");

    let (reports, network_calls) = replay(trace, &config.bridge).await?;
    for report in &reports {
        output.record("step", report);
    }
    output.report(
        "replay",
        &ReplaySummary {
            steps: reports.len(),
            network_calls,
        },
    );
    Ok(())
}

/// Runs every step in order and returns a report per step, plus the calls
/// the simulated network received.
pub async fn replay(trace: Trace, bridge_config: &BridgeConfig) -> Result<(Vec<StepReport>, Vec<NetworkCall>)> {
    let network = Arc::new(SimulatedNetwork::new());
    for conversation in &trace.conversations {
        network.add_conversation(conversation.clone());
    }
    for conversation_id in &trace.relay_identities {
        network.create_relay_identity(conversation_id);
    }
    network.set_split_len(trace.network.split_len);
    network.set_reject_uploads(trace.network.reject_uploads);

    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let flags = KvBridgingFlags::new(storage.clone());
    for account in &trace.bridge_all {
        flags.set_bridge_all(account, true)?;
    }
    let (delivery, deliveries) = ChannelDelivery::unbounded();

    let bridge = Bridge::new(BridgeOptions {
        config: bridge_config.clone(),
        network: network.clone(),
        delivery: Arc::new(delivery),
        store: Arc::new(KvEventIdentityStore::new(storage)),
        flags: Arc::new(flags),
        translator: None,
    });
    for session in &trace.accounts {
        bridge.link(session.clone());
    }

    let mut reports = Vec::with_capacity(trace.steps.len());
    for (index, step) in trace.steps.iter().enumerate() {
        let outcome = run_step(&bridge, &network, &trace, step)
            .await
            .with_context(|| format!("Step {} ({}) failed", index, step.name()))?;
        reports.push(StepReport {
            index,
            step: step.name(),
            outcome,
            deliveries: deliveries.try_iter().collect(),
        });
    }
    Ok((reports, network.calls()))
}

async fn run_step(
    bridge: &Bridge,
    network: &SimulatedNetwork,
    trace: &Trace,
    step: &Step,
) -> Result<serde_json::Value> {
    let value = match step {
        Step::LocalMessage {
            account,
            conversation,
            message,
        } => serde_json::to_value(bridge.on_local_message(account, conversation, message).await)?,
        Step::LocalReply {
            account,
            conversation,
            message,
            reply_to,
        } => serde_json::to_value(
            bridge
                .on_local_reply(account, conversation, message, reply_to)
                .await,
        )?,
        Step::LocalFile {
            account,
            conversation,
            file,
        } => serde_json::to_value(bridge.on_local_file(account, conversation, file).await)?,
        Step::LocalEdit {
            account,
            conversation,
            message,
            target,
        } => serde_json::to_value(
            bridge
                .on_local_edit(account, conversation, message, target)
                .await,
        )?,
        Step::LocalRedact {
            account,
            conversation,
            target,
        } => serde_json::to_value(bridge.on_local_redact(account, conversation, target).await)?,
        Step::LocalReaction {
            account,
            conversation,
            target,
            reaction,
            relay_as,
        } => serde_json::to_value(
            bridge
                .on_local_reaction(account, conversation, target, reaction, relay_as.as_ref())
                .await,
        )?,
        Step::RemoteCreated { account, message } => {
            serde_json::to_value(bridge.on_remote_created(account, message).await)?
        }
        Step::RemoteUpdated {
            account,
            before,
            after,
        } => serde_json::to_value(
            bridge
                .on_remote_updated(account, before.as_ref(), after)
                .await,
        )?,
        Step::RemoteDeleted { account, message } => {
            serde_json::to_value(bridge.on_remote_deleted(account, message).await)?
        }
        Step::RemoteDeletedBulk { account, messages } => {
            serde_json::to_value(bridge.on_remote_deleted_bulk(account, messages).await)?
        }
        Step::RemoteReactionAdded { account, reaction } => {
            serde_json::to_value(bridge.on_remote_reaction_added(account, reaction).await)?
        }
        Step::RemoteReactionRemoved { account, reaction } => {
            serde_json::to_value(bridge.on_remote_reaction_removed(account, reaction).await)?
        }
        Step::RemoteReactionsCleared { account, message } => {
            serde_json::to_value(bridge.on_remote_reactions_cleared(account, message).await)?
        }
        Step::Echo { account, send } => {
            let echoes = echoes_of_send(network, trace, account, *send).await?;
            let mut outcomes = Vec::with_capacity(echoes.len());
            for echo in &echoes {
                outcomes.push(bridge.on_remote_created(account, echo).await);
            }
            serde_json::to_value(outcomes)?
        }
        Step::FailNext { count } => {
            network.fail_next(*count);
            serde_json::Value::Null
        }
        Step::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            serde_json::Value::Null
        }
        Step::Sweep => serde_json::json!({ "expired": bridge.sweep() }),
    };
    Ok(value)
}

async fn echoes_of_send(
    network: &SimulatedNetwork,
    trace: &Trace,
    account: &str,
    send: usize,
) -> Result<Vec<RemoteMessage>> {
    let (conversation_id, message, remote_ids) = network
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            NetworkCall::Send {
                conversation_id,
                message,
                remote_ids,
                ..
            } => Some((conversation_id, message, remote_ids)),
            _ => None,
        })
        .nth(send)
        .with_context(|| format!("No send #{} to echo", send))?;

    let author = trace
        .accounts
        .iter()
        .find(|session| session.account == account)
        .map(|session| session.user_id.clone())
        .with_context(|| format!("Account {} is not in the trace", account))?;
    let conversation = network
        .resolve_conversation(account, &conversation_id)
        .await?
        .with_context(|| format!("Unknown conversation {}", conversation_id))?;

    Ok(network.echoes_of(&author, &conversation, &message, &remote_ids))
}
