//! Request queues feeding the transport loop.
//!
//! Many producer tasks enqueue; the transport loop is the single consumer.
//! Waiters are woken through a [`Notify`] using the register-then-check
//! pattern, so a notification between the emptiness check and the await is
//! never lost.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// An unbounded FIFO with a "data available" signal and a drain-on-close
/// operation.
///
/// The queue is unbounded, matching the behaviour of the client this
/// transport serves; callers wanting backpressure bound their own
/// submission rate.
pub struct RequestQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    /// Create an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an item. Non-blocking.
    ///
    /// # Errors
    ///
    /// Returns the item back when the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(item);
            }
            state.items.push_back(item);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Remove and return the oldest item, if any.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Wait until the queue is non-empty or closed.
    pub async fn wait_available(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let state = self.lock();
                if state.closed || !state.items.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Close the queue and fail every still-queued item.
    ///
    /// Idempotent; items enqueued before the close are drained exactly once.
    pub fn close_and_drain(&self, mut fail_each: impl FnMut(T)) {
        let drained: Vec<T> = {
            let mut state = self.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.notify.notify_waiters();
        for item in drained {
            fail_each(item);
        }
    }

    /// Whether `close_and_drain` has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
