//! Registry of live viewer mailboxes.
//!
//! Each streaming connection owns a [`Subscription`]: the receiving half of a
//! bounded mailbox. The registry holds the sending halves, keyed by the
//! mailbox's own id, behind a single reader/writer lock. Fanout iterates
//! under the read lock so concurrent fanouts never block each other;
//! register and unregister take the write lock.
//!
//! Every critical section is a short map operation or a round of
//! non-blocking `try_send`s; none spans an `.await` point or a storage call.

use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use worklog_types::{Entry, DEFAULT_MAILBOX_CAPACITY};

/// Identity of one mailbox. Never reused within a registry.
pub type MailboxId = u64;

#[derive(Default)]
struct Members {
    mailboxes: HashMap<MailboxId, mpsc::Sender<Entry>>,
    /// Set by `close_all`; no new members are admitted afterwards.
    closed: bool,
}

struct RegistryInner {
    members: RwLock<Members>,
    next_id: AtomicU64,
    mailbox_capacity: usize,
}

/// Thread-safe set of live viewer mailboxes.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl ClientRegistry {
    /// Creates an empty registry whose mailboxes hold `mailbox_capacity`
    /// entries each.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                members: RwLock::new(Members::default()),
                next_id: AtomicU64::new(1),
                mailbox_capacity: mailbox_capacity.max(1),
            }),
        }
    }

    /// Opens a new mailbox and registers it.
    ///
    /// The mailbox only receives entries published after this call. Once
    /// the registry has been closed the returned subscription is already
    /// closed and yields nothing.
    pub fn register(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.mailbox_capacity);

        let admitted = {
            let mut members = self
                .inner
                .members
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if members.closed {
                false
            } else {
                members.mailboxes.insert(id, tx);
                true
            }
        };

        if admitted {
            tracing::debug!(mailbox_id = id, "viewer registered");
        } else {
            tracing::debug!(mailbox_id = id, "registry closed, viewer not admitted");
        }

        Subscription {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Removes a mailbox and closes it.
    ///
    /// Returns `false` if it was not registered; a second call for the same
    /// id is a no-op.
    pub fn unregister(&self, id: MailboxId) -> bool {
        let removed = self
            .inner
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .mailboxes
            .remove(&id);

        // Dropping the last sender closes the mailbox.
        match removed {
            Some(_sender) => {
                tracing::debug!(mailbox_id = id, "viewer unregistered");
                true
            }
            None => false,
        }
    }

    /// Calls `f` once for every registered mailbox, under the read lock.
    ///
    /// `f` must not block and must not call back into the registry.
    pub fn for_each_open<F>(&self, mut f: F)
    where
        F: FnMut(MailboxId, &mpsc::Sender<Entry>),
    {
        let members = self
            .inner
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, sender) in &members.mailboxes {
            f(*id, sender);
        }
    }

    /// Closes every mailbox and refuses further registrations.
    ///
    /// Returns the number of mailboxes closed.
    pub fn close_all(&self) -> usize {
        let mut members = self
            .inner
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        members.closed = true;
        let count = members.mailboxes.len();
        members.mailboxes.clear();
        count
    }

    /// Number of registered mailboxes.
    pub fn len(&self) -> usize {
        self.inner
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mailboxes
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.inner.mailbox_capacity
    }
}

/// Receiving side of a registered mailbox.
///
/// Dropping the subscription unregisters it, so a stream that is dropped
/// when its peer disconnects releases its registry entry immediately.
pub struct Subscription {
    id: MailboxId,
    rx: mpsc::Receiver<Entry>,
    registry: ClientRegistry,
}

impl Subscription {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Waits for the next entry. `None` once the mailbox is closed.
    pub async fn recv(&mut self) -> Option<Entry> {
        self.rx.recv().await
    }

    /// Returns a queued entry without waiting.
    pub fn try_recv(&mut self) -> Result<Entry, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for Subscription {
    type Item = Entry;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Entry>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
