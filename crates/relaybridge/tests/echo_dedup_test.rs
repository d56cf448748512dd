use relaybridge::simulated::{remote_text, SimulatedNetwork};
use relaybridge::{
    Bridge, BridgeConfig, BridgeOptions, ChannelDelivery, Conversation, ConversationKey,
    DeliveryEvent, EchoKind, InMemoryStorage, InboundOutcome, KvBridgingFlags,
    KvEventIdentityStore, LocalMessage, OutboundOutcome, OutgoingMessage, RelaySender,
    SessionHandle, StorageAdapter,
};
use std::sync::Arc;
use std::time::Duration;

const ACCOUNT: &str = "1";
const ME: &str = "me";

struct Harness {
    bridge: Arc<Bridge>,
    network: Arc<SimulatedNetwork>,
    events: crossbeam_channel::Receiver<DeliveryEvent>,
}

fn dm() -> Conversation {
    Conversation::direct("dm-bob", "bob")
}

fn chan() -> Conversation {
    Conversation::guild_channel("chan", "g1", "Guild", "general")
}

fn harness() -> Harness {
    let network = Arc::new(SimulatedNetwork::new());
    network.add_conversation(dm());
    network.add_conversation(chan());

    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let flags = KvBridgingFlags::new(storage.clone());
    flags.set_channel_bridged(ACCOUNT, "chan", true).unwrap();
    let (delivery, events) = ChannelDelivery::unbounded();

    let bridge = Bridge::new(BridgeOptions {
        config: BridgeConfig::default(),
        network: network.clone(),
        delivery: Arc::new(delivery),
        store: Arc::new(KvEventIdentityStore::new(storage)),
        flags: Arc::new(flags),
        translator: None,
    });
    bridge.link(SessionHandle {
        account: ACCOUNT.to_string(),
        user_id: ME.to_string(),
        is_bot: false,
    });

    Harness {
        bridge: Arc::new(bridge),
        network,
        events,
    }
}

fn local(event_id: &str, body: &str) -> LocalMessage {
    LocalMessage {
        event_id: event_id.to_string(),
        body: body.to_string(),
        formatted_body: None,
        relay_as: None,
    }
}

fn sent_ids(outcome: OutboundOutcome) -> Vec<String> {
    match outcome {
        OutboundOutcome::Sent(ids) => ids,
        other => panic!("expected a send, got {:?}", other),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn echo_of_hello_is_suppressed_once() {
    let h = harness();

    let ids = sent_ids(h.bridge.on_local_message(ACCOUNT, "dm-bob", &local("$e1", "hello")).await);
    assert_eq!(ids.len(), 1);

    let echo = remote_text(&ids[0], &dm(), ME, "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &echo).await,
        InboundOutcome::Suppressed(EchoKind::Ledger)
    );

    // The same text sent again from the remote client is a new message.
    let later = remote_text("2000", &dm(), ME, "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &later).await,
        InboundOutcome::Forwarded
    );

    let delivered: Vec<DeliveryEvent> = h.events.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        DeliveryEvent::Message { origin, content } => {
            assert_eq!(origin.event_id, "2000");
            assert_eq!(content.body, "hello");
        }
        other => panic!("unexpected delivery {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn echo_arriving_before_send_returns_is_suppressed() {
    let h = harness();
    h.network.set_send_delay(Duration::from_millis(500));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let send = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$e1", "hello"))
            .await
    });
    let core_bridge = h.bridge.clone();
    wait_until(|| !core_bridge.core().ledger.pending(&key).is_empty()).await;

    // The network delivers the echo while the send call is still pending.
    let echo = remote_text("1000", &dm(), ME, "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &echo).await,
        InboundOutcome::Suppressed(EchoKind::Ledger)
    );

    let ids = sent_ids(send.await.unwrap());
    assert_eq!(ids, vec!["1000"]);
    assert!(h.bridge.core().ledger.pending(&key).is_empty());
    assert!(h.events.try_iter().next().is_none());
}

#[tokio::test(start_paused = true)]
async fn identical_text_from_another_user_is_forwarded() {
    let h = harness();
    h.network.set_send_delay(Duration::from_millis(500));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let send = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$e1", "hello"))
            .await
    });
    let core_bridge = h.bridge.clone();
    wait_until(|| !core_bridge.core().ledger.pending(&key).is_empty()).await;

    let from_bob = remote_text("999", &dm(), "bob", "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &from_bob).await,
        InboundOutcome::Forwarded
    );
    send.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn registration_does_not_leak_into_other_conversations() {
    let h = harness();
    h.network.set_send_delay(Duration::from_millis(500));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let send = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$e1", "hello"))
            .await
    });
    let core_bridge = h.bridge.clone();
    wait_until(|| !core_bridge.core().ledger.pending(&key).is_empty()).await;

    let elsewhere = remote_text("998", &chan(), ME, "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &elsewhere).await,
        InboundOutcome::Forwarded
    );
    send.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sends_reach_the_network_in_submission_order() {
    let h = harness();
    h.network.set_send_delay(Duration::from_millis(200));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let first = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$a", "A"))
            .await
    });
    let core_bridge = h.bridge.clone();
    let lock_key = key.clone();
    wait_until(|| core_bridge.core().serializer.is_held(&lock_key)).await;

    let bridge = h.bridge.clone();
    let second = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$b", "B"))
            .await
    });

    let a = sent_ids(first.await.unwrap());
    let b = sent_ids(second.await.unwrap());
    let id_of = |ids: &[String]| ids[0].parse::<u64>().unwrap();
    assert!(id_of(&a) < id_of(&b));
    assert_eq!(h.network.sent_texts(), vec!["A", "B"]);
    assert!(!h.bridge.core().serializer.is_held(&key));
}

#[tokio::test(start_paused = true)]
async fn stuck_send_releases_the_conversation_after_timeout() {
    let h = harness();
    h.network.set_send_delay(Duration::from_secs(60));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let stuck = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$a", "stuck"))
            .await
    });
    let core_bridge = h.bridge.clone();
    wait_until(|| core_bridge.core().serializer.is_held(&key)).await;
    h.network.set_send_delay(Duration::ZERO);

    let started = tokio::time::Instant::now();
    let next = h
        .bridge
        .on_local_message(ACCOUNT, "dm-bob", &local("$b", "next"))
        .await;
    assert!(matches!(next, OutboundOutcome::Sent(_)));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(!stuck.is_finished());

    assert!(matches!(stuck.await.unwrap(), OutboundOutcome::Sent(_)));
    assert_eq!(h.network.sent_texts(), vec!["next", "stuck"]);
}

#[tokio::test(start_paused = true)]
async fn expired_registration_no_longer_suppresses() {
    let h = harness();
    let ids = sent_ids(h.bridge.on_local_message(ACCOUNT, "dm-bob", &local("$e1", "late")).await);

    tokio::time::advance(Duration::from_secs(31)).await;

    let echo = remote_text(&ids[0], &dm(), ME, "late");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &echo).await,
        InboundOutcome::Forwarded
    );
}

#[tokio::test]
async fn split_send_suppresses_every_part() {
    let h = harness();
    h.network.set_split_len(Some(5));

    let message = local("$long", "hello world");
    let ids = sent_ids(h.bridge.on_local_message(ACCOUNT, "dm-bob", &message).await);
    assert_eq!(ids.len(), 3);

    let echoes = h.network.echoes_of(
        ME,
        &dm(),
        &OutgoingMessage::text("hello world", None),
        &ids,
    );
    for echo in &echoes {
        assert_eq!(
            h.bridge.on_remote_created(ACCOUNT, echo).await,
            InboundOutcome::Suppressed(EchoKind::Ledger)
        );
    }
    assert!(h
        .bridge
        .core()
        .ledger
        .pending(&ConversationKey::new(ACCOUNT, "dm-bob"))
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn split_part_echoed_before_send_returns_is_suppressed() {
    let h = harness();
    h.network.set_split_len(Some(5));
    h.network.set_send_delay(Duration::from_millis(500));
    let key = ConversationKey::new(ACCOUNT, "dm-bob");

    let bridge = h.bridge.clone();
    let send = tokio::spawn(async move {
        bridge
            .on_local_message(ACCOUNT, "dm-bob", &local("$long", "hello world"))
            .await
    });
    let core_bridge = h.bridge.clone();
    let pending_key = key.clone();
    wait_until(|| !core_bridge.core().ledger.pending(&pending_key).is_empty()).await;

    let first_part = remote_text("1000", &dm(), ME, "hello");
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &first_part).await,
        InboundOutcome::Suppressed(EchoKind::Ledger)
    );

    let ids = sent_ids(send.await.unwrap());
    assert_eq!(ids, vec!["1000", "1001", "1002"]);
    for (id, part) in [("1001", " worl"), ("1002", "d")] {
        let echo = remote_text(id, &dm(), ME, part);
        assert_eq!(
            h.bridge.on_remote_created(ACCOUNT, &echo).await,
            InboundOutcome::Suppressed(EchoKind::Ledger)
        );
    }

    assert!(h.bridge.core().ledger.pending(&key).is_empty());
    assert!(h.events.try_iter().next().is_none());
}

#[tokio::test]
async fn relayed_echo_is_suppressed_by_relay_identity() {
    let h = harness();
    h.network.create_relay_identity("chan");

    let mut message = local("$e1", "from the other side");
    message.relay_as = Some(RelaySender {
        display_name: "Alice".to_string(),
        avatar_url: None,
    });
    let ids = sent_ids(h.bridge.on_local_message(ACCOUNT, "chan", &message).await);

    let outgoing = OutgoingMessage::text("from the other side", message.relay_as.clone());
    let echoes = h.network.echoes_of(ME, &chan(), &outgoing, &ids);
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &echoes[0]).await,
        InboundOutcome::Suppressed(EchoKind::RelayIdentity)
    );

    // Someone else's webhook in the same channel is not ours.
    let mut foreign = remote_text("5000", &chan(), "other-hook", "hi");
    foreign.relay_identity = Some("other-hook".to_string());
    assert_eq!(
        h.bridge.on_remote_created(ACCOUNT, &foreign).await,
        InboundOutcome::Forwarded
    );
}
