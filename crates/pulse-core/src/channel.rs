//! Fixed-capacity queue with a drop-oldest overflow policy.
//!
//! The producer side never blocks on the default path: [`DropOldest::publish`]
//! evicts the oldest unread item to admit the newest one. [`DropOldest::send`]
//! is the waiting alternative for producers that must not lose items.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::snapshot::Snapshot;

/// Queue carrying snapshots from the builder to the renderer.
pub type SnapshotChannel = DropOldest<Snapshot>;

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
}

/// Bounded FIFO that discards its oldest entry on overflow.
#[derive(Debug)]
pub struct DropOldest<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    space: Notify,
}

/// Returned by [`DropOldest::send`] when the queue was closed; carries the item back.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> DropOldest<T> {
    pub const DEFAULT_CAPACITY: usize = 5;

    /// Creates a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
            }),
            capacity,
            space: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total number of items discarded to make room for newer ones.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Enqueues `item`, evicting the oldest entry when full.
    ///
    /// Returns the evicted entry, if any. Items published after [`close`](Self::close)
    /// are dropped.
    pub fn publish(&self, item: T) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let evicted = if state.items.len() >= self.capacity {
            state.evicted += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        evicted
    }

    /// Enqueues `item`, waiting for free space instead of evicting.
    ///
    /// # Errors
    /// Returns the item when the queue is closed before space frees up.
    pub async fn send(&self, item: T) -> Result<(), Closed<T>> {
        let mut item = Some(item);
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(value) = item.take() {
                    if state.closed {
                        return Err(Closed(value));
                    }
                    if state.items.len() < self.capacity {
                        state.items.push_back(value);
                        return Ok(());
                    }
                    item = Some(value);
                }
            }
            notified.await;
        }
    }

    /// Pops the oldest unread item.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.space.notify_waiters();
        }
        item
    }

    /// Empties the queue and returns only the newest item.
    pub fn drain_latest(&self) -> Option<T> {
        let latest = {
            let mut state = self.lock();
            let latest = state.items.pop_back();
            state.items.clear();
            latest
        };
        if latest.is_some() {
            self.space.notify_waiters();
        }
        latest
    }

    /// Empties the queue, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.lock().items.drain(..).collect();
        if !items.is_empty() {
            self.space.notify_waiters();
        }
        items
    }

    /// Copies of the newest `n` items, oldest first, without consuming them.
    pub fn recent(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        let state = self.lock();
        let skip = state.items.len().saturating_sub(n);
        state.items.iter().skip(skip).cloned().collect()
    }

    /// Drops queued items and rejects further publishes. Wakes waiting senders.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.items.clear();
        }
        self.space.notify_waiters();
    }
}

impl<T> Default for DropOldest<T> {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
