use crate::ConversationKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Proof of holding a conversation's send lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    key: ConversationKey,
    generation: u64,
}

impl SendTicket {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

struct Holder {
    generation: u64,
    since: Instant,
    released: Arc<Notify>,
}

/// At most one in-flight send per conversation.
///
/// Waiting is bounded: once the current holder has held a key for longer
/// than the timeout, the next `acquire` takes the lock over and logs a
/// warning. A hung network call therefore delays a conversation but never
/// blocks it for good, at the price of possibly interleaving with the stuck
/// send if it ever completes.
pub struct SendSerializer {
    timeout: Duration,
    next_generation: AtomicU64,
    held: Mutex<HashMap<ConversationKey, Holder>>,
}

impl SendSerializer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_generation: AtomicU64::new(1),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &ConversationKey) -> SendTicket {
        loop {
            let (released, seen_generation, deadline) = {
                let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                match held.get_mut(key) {
                    None => {
                        let generation = self.next_generation();
                        held.insert(
                            key.clone(),
                            Holder {
                                generation,
                                since: now,
                                released: Arc::new(Notify::new()),
                            },
                        );
                        return SendTicket {
                            key: key.clone(),
                            generation,
                        };
                    }
                    Some(holder) if now >= holder.since + self.timeout => {
                        warn!(
                            conversation = %key,
                            held_for_ms = now.saturating_duration_since(holder.since).as_millis() as u64,
                            "send lock timed out, granting it to the next sender"
                        );
                        let generation = self.next_generation();
                        holder.generation = generation;
                        holder.since = now;
                        return SendTicket {
                            key: key.clone(),
                            generation,
                        };
                    }
                    Some(holder) => (
                        holder.released.clone(),
                        holder.generation,
                        holder.since + self.timeout,
                    ),
                }
            };

            let notified = released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // A release between reading the holder and registering for the
            // wakeup would otherwise be missed.
            if !self.is_held_by(key, seen_generation) {
                continue;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    /// Releases `key` whoever holds it. Releasing an unheld key is a no-op.
    pub fn release(&self, key: &ConversationKey) {
        let holder = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            held.remove(key)
        };
        if let Some(holder) = holder {
            holder.released.notify_waiters();
        }
    }

    /// Releases the lock only if `ticket` still holds it, so a sender that was
    /// timed out cannot free the lock of whoever took over.
    pub fn release_ticket(&self, ticket: &SendTicket) {
        let holder = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            match held.get(&ticket.key) {
                Some(holder) if holder.generation == ticket.generation => held.remove(&ticket.key),
                Some(_) => {
                    debug!(conversation = %ticket.key, "ignoring release of a superseded send lock");
                    None
                }
                None => None,
            }
        };
        if let Some(holder) = holder {
            holder.released.notify_waiters();
        }
    }

    pub fn is_held(&self, key: &ConversationKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    fn is_held_by(&self, key: &ConversationKey, generation: u64) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|holder| holder.generation == generation)
            .unwrap_or(false)
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }
}
