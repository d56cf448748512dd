use crate::{ConversationKey, Fingerprint};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Send in flight; the remote id is not known yet.
    Locked,
    /// Send returned; waiting for the network to echo the confirmed ids.
    AwaitingEcho,
}

/// A locally originated event whose echo has not been fully observed yet.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub originator: String,
    pub fingerprint: Fingerprint,
    pub state: PendingState,
    pub created_at: Instant,
    token: u64,
    touched_at: Instant,
    awaiting_ids: Vec<String>,
    echoed_ids: Vec<String>,
    /// Bytes of a text fingerprint already matched by part echoes of a split send.
    matched_len: usize,
}

impl PendingSend {
    /// Confirmed remote ids whose echo has not arrived yet.
    pub fn awaiting_ids(&self) -> &[String] {
        &self.awaiting_ids
    }

    fn fingerprint_consumed(&self) -> bool {
        !self.echoed_ids.is_empty()
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.touched_at) >= ttl
    }

    /// Length of the prefix of the unmatched body that `part` covers, if the
    /// echo is the next part of a split send. Whitespace the network dropped
    /// at the split point is skipped.
    fn next_segment(&self, part: &Fingerprint) -> Option<usize> {
        if !self.fingerprint.is_text() {
            return None;
        }
        let rest = self.fingerprint.as_str().get(self.matched_len..)?;
        let part = part.as_str().trim();
        if part.is_empty() {
            return None;
        }
        let trimmed = rest.trim_start();
        trimmed
            .starts_with(part)
            .then_some(rest.len() - trimmed.len() + part.len())
    }
}

/// Handle returned by [`DedupeLedger::register_outgoing`], used to confirm
/// the send once the network has assigned ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoToken {
    key: ConversationKey,
    originator: String,
    id: u64,
}

impl EchoToken {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn originator(&self) -> &str {
        &self.originator
    }
}

/// Per-conversation record of the events this process originated, so the
/// network's echo of them can be recognized and dropped.
///
/// Registrations are matched FIFO. A registration is consumed at most once
/// by fingerprint; after the send is confirmed it is matched by remote id
/// only, so an unrelated message that happens to carry the same text is
/// still delivered.
pub struct DedupeLedger {
    ttl: Duration,
    next_token: AtomicU64,
    pending: Mutex<HashMap<ConversationKey, VecDeque<PendingSend>>>,
}

impl DedupeLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_token: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_outgoing(
        &self,
        key: &ConversationKey,
        originator: &str,
        fingerprint: Fingerprint,
    ) -> EchoToken {
        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        debug!(conversation = %key, originator, fingerprint = %fingerprint, "registering outgoing send");

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entries = pending.entry(key.clone()).or_default();
        prune(entries, now, self.ttl);
        entries.push_back(PendingSend {
            originator: originator.to_string(),
            fingerprint,
            state: PendingState::Locked,
            created_at: now,
            token: id,
            touched_at: now,
            awaiting_ids: Vec::new(),
            echoed_ids: Vec::new(),
            matched_len: 0,
        });

        EchoToken {
            key: key.clone(),
            originator: originator.to_string(),
            id,
        }
    }

    /// Returns `true` if the inbound event is the echo of one of our sends.
    pub fn try_consume_echo(
        &self,
        key: &ConversationKey,
        originator: &str,
        remote_event_id: &str,
        fingerprint: &Fingerprint,
    ) -> bool {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = pending.get_mut(key) else {
            return false;
        };
        prune(entries, now, self.ttl);

        let by_id = entries.iter().position(|entry| {
            entry.originator == originator
                && entry.awaiting_ids.iter().any(|id| id == remote_event_id)
        });
        if let Some(index) = by_id {
            let entry = &mut entries[index];
            entry.awaiting_ids.retain(|id| id != remote_event_id);
            entry.echoed_ids.push(remote_event_id.to_string());
            if entry.awaiting_ids.is_empty() {
                entries.remove(index);
            }
            debug!(conversation = %key, event_id = remote_event_id, "echo matched by remote id");
            cleanup_key(&mut pending, key);
            return true;
        }

        let by_fingerprint = entries.iter().position(|entry| {
            entry.state == PendingState::Locked
                && !entry.fingerprint_consumed()
                && entry.originator == originator
                && &entry.fingerprint == fingerprint
        });
        if let Some(index) = by_fingerprint {
            // Kept until the sender confirms, so confirmation can tell this
            // id was already seen.
            let entry = &mut entries[index];
            entry.echoed_ids.push(remote_event_id.to_string());
            entry.matched_len = entry.fingerprint.as_str().len();
            debug!(conversation = %key, event_id = remote_event_id, "echo matched by fingerprint");
            return true;
        }

        // A split send echoes part by part, possibly before the send returns.
        let by_segment = entries.iter().enumerate().find_map(|(index, entry)| {
            if entry.state != PendingState::Locked || entry.originator != originator {
                return None;
            }
            entry.next_segment(fingerprint).map(|len| (index, len))
        });
        if let Some((index, len)) = by_segment {
            let entry = &mut entries[index];
            entry.echoed_ids.push(remote_event_id.to_string());
            entry.matched_len += len;
            debug!(
                conversation = %key,
                event_id = remote_event_id,
                matched = entry.matched_len,
                "echo matched as part of a split send"
            );
            return true;
        }

        false
    }

    /// Confirms a successful send with the ids the network assigned.
    ///
    /// Ids whose echo already arrived need no further bookkeeping; the rest
    /// are awaited until the echo TTL elapses. A token whose registration is
    /// gone (expired) is ignored.
    pub fn release(&self, token: &EchoToken, remote_event_ids: &[String]) {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = pending.get_mut(&token.key) else {
            debug!(conversation = %token.key, "release for unknown conversation");
            return;
        };
        let Some(index) = entries.iter().position(|entry| entry.token == token.id) else {
            debug!(conversation = %token.key, "release for expired registration");
            return;
        };

        let entry = &mut entries[index];
        for id in remote_event_ids {
            if !entry.echoed_ids.contains(id) && !entry.awaiting_ids.contains(id) {
                entry.awaiting_ids.push(id.clone());
            }
        }
        entry.state = PendingState::AwaitingEcho;
        entry.touched_at = now;
        if entry.awaiting_ids.is_empty() {
            entries.remove(index);
        }
        cleanup_key(&mut pending, &token.key);
    }

    /// Drops every expired registration. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        pending.retain(|_, entries| {
            removed += prune(entries, now, self.ttl);
            !entries.is_empty()
        });
        removed
    }

    pub fn pending(&self, key: &ConversationKey) -> Vec<PendingSend> {
        let now = Instant::now();
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| !entry.is_expired(now, self.ttl))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn prune(entries: &mut VecDeque<PendingSend>, now: Instant, ttl: Duration) -> usize {
    let before = entries.len();
    entries.retain(|entry| !entry.is_expired(now, ttl));
    before - entries.len()
}

fn cleanup_key(pending: &mut HashMap<ConversationKey, VecDeque<PendingSend>>, key: &ConversationKey) {
    if pending.get(key).map(|e| e.is_empty()).unwrap_or(false) {
        pending.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn key(conversation: &str) -> ConversationKey {
        ConversationKey::new("1", conversation)
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn echo_is_suppressed_exactly_once() {
        let ledger = DedupeLedger::new(TTL);
        let hello = Fingerprint::text("hello");
        ledger.register_outgoing(&key("c"), "me", hello.clone());

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &hello));
        assert!(!ledger.try_consume_echo(&key("c"), "me", "r2", &hello));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_send_matches_by_id_then_forgets() {
        let ledger = DedupeLedger::new(TTL);
        let hello = Fingerprint::text("hello");
        let token = ledger.register_outgoing(&key("c"), "me", hello.clone());
        ledger.release(&token, &ids(&["r1"]));

        // A second, unrelated "hello" is not an echo.
        assert!(!ledger.try_consume_echo(&key("c"), "me", "r9", &hello));
        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &hello));
        assert!(!ledger.try_consume_echo(&key("c"), "me", "r1", &hello));
        assert!(ledger.pending(&key("c")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_after_echo_is_a_no_op() {
        let ledger = DedupeLedger::new(TTL);
        let hello = Fingerprint::text("hello");
        let token = ledger.register_outgoing(&key("c"), "me", hello.clone());

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &hello));
        ledger.release(&token, &ids(&["r1"]));
        assert!(ledger.pending(&key("c")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn edited_content_still_matches_by_id() {
        let ledger = DedupeLedger::new(TTL);
        let token = ledger.register_outgoing(&key("c"), "me", Fingerprint::text("**bold**"));
        ledger.release(&token, &ids(&["r1"]));

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &Fingerprint::text("bold")));
    }

    #[tokio::test(start_paused = true)]
    async fn split_send_awaits_every_part() {
        let ledger = DedupeLedger::new(TTL);
        let long = Fingerprint::text("very long message");
        let token = ledger.register_outgoing(&key("c"), "me", long);
        ledger.release(&token, &ids(&["p1", "p2"]));

        assert!(ledger.try_consume_echo(&key("c"), "me", "p1", &Fingerprint::text("very long")));
        assert!(ledger.try_consume_echo(&key("c"), "me", "p2", &Fingerprint::text(" message")));
        assert!(ledger.pending(&key("c")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn split_parts_match_while_send_is_in_flight() {
        let ledger = DedupeLedger::new(TTL);
        let token = ledger.register_outgoing(&key("c"), "me", Fingerprint::text("hello world"));

        assert!(ledger.try_consume_echo(&key("c"), "me", "p1", &Fingerprint::text("hello")));
        // Out of order or repeated parts are not ours.
        assert!(!ledger.try_consume_echo(&key("c"), "me", "px", &Fingerprint::text("d")));
        assert!(!ledger.try_consume_echo(&key("c"), "me", "py", &Fingerprint::text("hello")));
        assert!(ledger.try_consume_echo(&key("c"), "me", "p2", &Fingerprint::text("worl")));

        ledger.release(&token, &ids(&["p1", "p2", "p3"]));
        assert_eq!(ledger.pending(&key("c"))[0].awaiting_ids(), ids(&["p3"]).as_slice());
        assert!(ledger.try_consume_echo(&key("c"), "me", "p3", &Fingerprint::text("d")));
        assert!(ledger.pending(&key("c")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn whole_echo_leaves_no_segments_to_match() {
        let ledger = DedupeLedger::new(TTL);
        let hello = Fingerprint::text("hello");
        ledger.register_outgoing(&key("c"), "me", hello.clone());

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &hello));
        assert!(!ledger.try_consume_echo(&key("c"), "me", "r2", &Fingerprint::text("hel")));
    }

    #[tokio::test(start_paused = true)]
    async fn file_sends_are_never_matched_by_segment() {
        let ledger = DedupeLedger::new(TTL);
        ledger.register_outgoing(&key("c"), "me", Fingerprint::file("cat.png"));

        assert!(!ledger.try_consume_echo(&key("c"), "me", "r1", &Fingerprint::text("file")));
        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &Fingerprint::file("cat.png")));
    }

    #[tokio::test(start_paused = true)]
    async fn other_conversation_is_never_suppressed() {
        let ledger = DedupeLedger::new(TTL);
        let f = Fingerprint::text("same");
        ledger.register_outgoing(&key("c1"), "me", f.clone());

        assert!(!ledger.try_consume_echo(&key("c2"), "me", "r1", &f));
        assert!(ledger.try_consume_echo(&key("c1"), "me", "r1", &f));
    }

    #[tokio::test(start_paused = true)]
    async fn other_originator_is_never_suppressed() {
        let ledger = DedupeLedger::new(TTL);
        let f = Fingerprint::text("hi");
        ledger.register_outgoing(&key("c"), "me", f.clone());

        assert!(!ledger.try_consume_echo(&key("c"), "someone-else", "r1", &f));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_fingerprints_are_consumed_fifo() {
        let ledger = DedupeLedger::new(TTL);
        let hi = Fingerprint::text("hi");
        let first = ledger.register_outgoing(&key("c"), "me", hi.clone());
        let second = ledger.register_outgoing(&key("c"), "me", hi.clone());

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &hi));
        let pending = ledger.pending(&key("c"));
        assert!(pending[0].fingerprint_consumed());
        assert!(!pending[1].fingerprint_consumed());

        assert!(ledger.try_consume_echo(&key("c"), "me", "r2", &hi));

        // Each registration saw its own echo.
        ledger.release(&first, &ids(&["r1"]));
        ledger.release(&second, &ids(&["r2"]));
        assert!(ledger.pending(&key("c")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn registrations_expire() {
        let ledger = DedupeLedger::new(TTL);
        let f = Fingerprint::text("lost");
        ledger.register_outgoing(&key("c"), "me", f.clone());

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert!(!ledger.try_consume_echo(&key("c"), "me", "r1", &f));
        assert_eq!(ledger.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_restarts_the_echo_window() {
        let ledger = DedupeLedger::new(TTL);
        let token = ledger.register_outgoing(&key("c"), "me", Fingerprint::text("slow"));
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        ledger.release(&token, &ids(&["r1"]));
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(ledger.try_consume_echo(&key("c"), "me", "r1", &Fingerprint::text("slow")));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries_across_keys() {
        let ledger = DedupeLedger::new(TTL);
        ledger.register_outgoing(&key("a"), "me", Fingerprint::text("x"));
        ledger.register_outgoing(&key("b"), "me", Fingerprint::text("y"));
        tokio::time::advance(TTL).await;

        assert_eq!(ledger.sweep(), 2);
        assert!(ledger.pending(&key("a")).is_empty());
    }
}
