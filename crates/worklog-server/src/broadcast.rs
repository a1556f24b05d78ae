//! Live fanout of persisted entries.
//!
//! The [`Broadcaster`] owns one intake queue and one sequential worker task.
//! Ingest publishes each persisted entry into the intake; the worker takes
//! entries in order and offers each one to every registered mailbox with a
//! non-blocking send. A full mailbox loses that entry; ingest and the other
//! viewers carry on.
//!
//! Publishing never blocks either. When the intake itself is full the entry
//! moves to an overflow lane: one task that feeds deferred entries into the
//! intake in the order they were published. While anything sits in that lane,
//! later publishes queue behind it, so intake order always matches publish
//! order. The lane is bounded both in how many entries may wait and in how
//! long each may wait. Entries that exhaust either bound are not delivered
//! live; they remain persisted and appear in the next snapshot.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use worklog_types::{Entry, DEFAULT_INTAKE_CAPACITY};

use crate::registry::ClientRegistry;

/// Tunables for the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Depth of the intake queue.
    pub intake_capacity: usize,
    /// How long a deferred publish waits for intake space.
    pub retry_timeout: Duration,
    /// Maximum number of deferred publishes outstanding at once.
    pub max_pending_retries: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            retry_timeout: Duration::from_secs(5),
            max_pending_retries: 64,
        }
    }
}

/// What happened to a published entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Placed on the intake queue.
    Queued,
    /// Placed in the overflow lane behind earlier deferred entries.
    Deferred,
    /// The overflow lane was full.
    Dropped,
    /// The broadcaster has shut down.
    Closed,
}

/// An entry waiting in the overflow lane. The permit is held until the
/// entry reaches the intake or gives up.
struct Deferred {
    entry: Entry,
    deadline: Instant,
    _permit: OwnedSemaphorePermit,
}

struct Lanes {
    intake: mpsc::Sender<Entry>,
    overflow: mpsc::Sender<Deferred>,
}

/// Sequential fanout service.
///
/// [`publish`](Self::publish) is synchronous and spawns nothing, so it may be
/// called from blocking threads as well as from async code.
pub struct Broadcaster {
    lanes: Mutex<Option<Lanes>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    retry_permits: Arc<Semaphore>,
    max_pending_retries: usize,
    retry_timeout: Duration,
    registry: ClientRegistry,
}

impl Broadcaster {
    /// Spawns the fanout worker. Must be called inside a tokio runtime.
    pub fn start(registry: ClientRegistry, settings: BroadcastSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.intake_capacity.max(1));
        let fanout = tokio::spawn(run_fanout(rx, registry.clone()));

        tracing::info!(
            intake_capacity = settings.intake_capacity,
            mailbox_capacity = registry.mailbox_capacity(),
            max_pending_retries = settings.max_pending_retries,
            "broadcaster started"
        );

        let broadcaster = Self::with_intake(tx, registry, settings);
        broadcaster
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fanout);
        broadcaster
    }

    /// Wires the overflow lane onto an existing intake sender.
    fn with_intake(
        intake: mpsc::Sender<Entry>,
        registry: ClientRegistry,
        settings: BroadcastSettings,
    ) -> Self {
        let (overflow_tx, overflow_rx) = mpsc::channel(settings.max_pending_retries.max(1));
        let overflow = tokio::spawn(run_overflow(overflow_rx, intake.clone()));

        Self {
            lanes: Mutex::new(Some(Lanes {
                intake,
                overflow: overflow_tx,
            })),
            tasks: Mutex::new(vec![overflow]),
            retry_permits: Arc::new(Semaphore::new(settings.max_pending_retries)),
            max_pending_retries: settings.max_pending_retries,
            retry_timeout: settings.retry_timeout,
            registry,
        }
    }

    /// Number of entries currently waiting in the overflow lane.
    pub fn pending_retries(&self) -> usize {
        self.max_pending_retries
            .saturating_sub(self.retry_permits.available_permits())
    }

    /// Hands a persisted entry to the fanout worker without blocking.
    pub fn publish(&self, entry: Entry) -> Publish {
        // Held across the routing decision so concurrent publishers are
        // ordered the same way in both lanes.
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(lanes) = lanes.as_ref() else {
            tracing::warn!(entry_id = entry.id, "broadcaster stopped, entry not delivered live");
            return Publish::Closed;
        };

        if self.pending_retries() > 0 {
            return self.defer(lanes, entry);
        }

        match lanes.intake.try_send(entry) {
            Ok(()) => Publish::Queued,
            Err(TrySendError::Full(entry)) => self.defer(lanes, entry),
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!(entry_id = entry.id, "broadcaster intake closed, entry not delivered live");
                Publish::Closed
            }
        }
    }

    fn defer(&self, lanes: &Lanes, entry: Entry) -> Publish {
        let Ok(permit) = Arc::clone(&self.retry_permits).try_acquire_owned() else {
            tracing::warn!(
                entry_id = entry.id,
                "broadcaster intake full and retry budget exhausted, entry not delivered live"
            );
            return Publish::Dropped;
        };

        let entry_id = entry.id;
        let deferred = Deferred {
            entry,
            deadline: Instant::now() + self.retry_timeout,
            _permit: permit,
        };
        match lanes.overflow.try_send(deferred) {
            Ok(()) => {
                tracing::debug!(entry_id, "broadcaster intake busy, publish deferred");
                Publish::Deferred
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(entry_id, "overflow lane full, entry not delivered live");
                Publish::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(entry_id, "broadcaster overflow closed, entry not delivered live");
                Publish::Closed
            }
        }
    }

    /// Stops accepting entries, drains the overflow lane and the intake,
    /// then closes every mailbox so open streams end.
    ///
    /// Deferred entries still waiting for intake space delay the drain by at
    /// most the retry timeout.
    pub async fn shutdown(&self) {
        let lanes = self
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(lanes);

        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("broadcaster task join error: {}", e);
            }
        }

        let closed = self.registry.close_all();
        tracing::info!(closed_mailboxes = closed, "broadcaster stopped");
    }
}

/// Feeds deferred entries into the intake one at a time, each until its
/// deadline. The permit is released only after the entry has been handled.
async fn run_overflow(mut overflow: mpsc::Receiver<Deferred>, intake: mpsc::Sender<Entry>) {
    while let Some(deferred) = overflow.recv().await {
        let Deferred {
            entry,
            deadline,
            _permit,
        } = deferred;
        let entry_id = entry.id;
        match tokio::time::timeout_at(deadline, intake.send(entry)).await {
            Ok(Ok(())) => tracing::debug!(entry_id, "deferred publish queued"),
            Ok(Err(_)) => {
                tracing::warn!(entry_id, "broadcaster closed before deferred publish")
            }
            Err(_) => tracing::warn!(
                entry_id,
                "deferred publish timed out, entry not delivered live"
            ),
        }
    }
}

async fn run_fanout(mut intake: mpsc::Receiver<Entry>, registry: ClientRegistry) {
    while let Some(entry) = intake.recv().await {
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        registry.for_each_open(|mailbox_id, mailbox| match mailbox.try_send(entry.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                tracing::debug!(
                    mailbox_id,
                    entry_id = entry.id,
                    "mailbox full, dropping entry for slow viewer"
                );
            }
            // The owning stream is going away and will unregister itself.
            Err(TrySendError::Closed(_)) => {}
        });

        tracing::trace!(entry_id = entry.id, delivered, dropped, "fanned out entry");
    }

    tracing::debug!("broadcaster intake drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64) -> Entry {
        Entry {
            id,
            username: None,
            message: format!("entry {id}"),
            tags: None,
            timestamp: "2026-10-18T09:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_registered_viewer() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::start(registry.clone(), BroadcastSettings::default());
        let mut sub = registry.register();

        assert_eq!(broadcaster.publish(entry(1)), Publish::Queued);
        let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("should receive within timeout")
            .expect("mailbox should be open");
        assert_eq!(got.id, 1);
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_closed() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::start(registry.clone(), BroadcastSettings::default());
        let mut sub = registry.register();

        broadcaster.shutdown().await;
        assert_eq!(broadcaster.publish(entry(1)), Publish::Closed);
        assert!(sub.recv().await.is_none(), "shutdown closes mailboxes");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_drains_queued_entries_first() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::start(registry.clone(), BroadcastSettings::default());
        let mut sub = registry.register();

        for id in 1..=5 {
            broadcaster.publish(entry(id));
        }
        broadcaster.shutdown().await;

        let mut ids = Vec::new();
        while let Some(e) = sub.recv().await {
            ids.push(e.id);
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    fn settings(max_pending_retries: usize, retry_timeout: Duration) -> BroadcastSettings {
        BroadcastSettings {
            intake_capacity: 1,
            retry_timeout,
            max_pending_retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_intake_defers_then_drops_when_budget_exhausted() {
        // No fanout worker, so the test drains the intake itself.
        let (tx, mut rx) = mpsc::channel(1);
        let broadcaster = Broadcaster::with_intake(
            tx,
            ClientRegistry::default(),
            settings(1, Duration::from_secs(5)),
        );

        assert_eq!(broadcaster.publish(entry(1)), Publish::Queued);
        assert_eq!(broadcaster.publish(entry(2)), Publish::Deferred);
        assert_eq!(broadcaster.publish(entry(3)), Publish::Dropped);

        // Freeing intake space lets the deferred publish land.
        assert_eq!(rx.recv().await.unwrap().id, 1);
        assert_eq!(rx.recv().await.unwrap().id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_publish_gives_up_after_timeout() {
        let (tx, mut rx) = mpsc::channel(1);
        let broadcaster = Broadcaster::with_intake(
            tx,
            ClientRegistry::default(),
            settings(1, Duration::from_millis(100)),
        );

        broadcaster.publish(entry(1));
        assert_eq!(broadcaster.publish(entry(2)), Publish::Deferred);
        assert_eq!(broadcaster.pending_retries(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(broadcaster.pending_retries(), 0, "timed-out retry releases its permit");

        assert_eq!(rx.recv().await.unwrap().id, 1);
        assert!(rx.try_recv().is_err(), "timed-out entry never reaches intake");
    }

    #[tokio::test(start_paused = true)]
    async fn later_publish_waits_behind_deferred_entry() {
        let (tx, mut rx) = mpsc::channel(1);
        let broadcaster = Broadcaster::with_intake(
            tx,
            ClientRegistry::default(),
            settings(4, Duration::from_secs(5)),
        );

        assert_eq!(broadcaster.publish(entry(1)), Publish::Queued);
        assert_eq!(broadcaster.publish(entry(2)), Publish::Deferred);

        // Intake has room again, but entry 2 is still waiting.
        assert_eq!(rx.recv().await.unwrap().id, 1);
        assert_eq!(broadcaster.publish(entry(3)), Publish::Deferred);

        let mut ids = Vec::new();
        for _ in 0..2 {
            ids.push(rx.recv().await.unwrap().id);
        }
        assert_eq!(ids, vec![2, 3]);

        tokio::task::yield_now().await;
        assert_eq!(broadcaster.pending_retries(), 0);
        assert_eq!(broadcaster.publish(entry(4)), Publish::Queued);
        assert_eq!(rx.recv().await.unwrap().id, 4);
    }

    #[tokio::test]
    async fn shutdown_drains_deferred_entries_in_order() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::start(
            registry.clone(),
            BroadcastSettings {
                intake_capacity: 1,
                ..BroadcastSettings::default()
            },
        );
        let mut sub = registry.register();

        for id in 1..=6 {
            assert_ne!(broadcaster.publish(entry(id)), Publish::Dropped);
        }
        broadcaster.shutdown().await;

        let mut ids = Vec::new();
        while let Some(e) = sub.recv().await {
            ids.push(e.id);
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }
}
