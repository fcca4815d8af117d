use super::backpressure::OverflowPolicy;
use super::error::BufferError;
use crate::domain::LogEvent;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Notify;

/// Bounded multi-producer, single-consumer queue between emitting threads and
/// the delivery loop.
///
/// Producers are synchronous and never touch the network; the consumer is
/// async. Overflow is resolved by [`OverflowPolicy`].
pub struct IngressQueue {
    events: Mutex<VecDeque<Arc<LogEvent>>>,
    space: Condvar,
    available: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
}

impl IngressQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        Ok(Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            space: Condvar::new(),
            available: Notify::new(),
            capacity,
            policy,
            closed: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue an event, applying the overflow policy when full.
    pub fn push(&self, event: Arc<LogEvent>) -> Result<(), BufferError> {
        if self.is_closed() {
            return Err(BufferError::BufferClosed);
        }

        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropNewest => return Err(BufferError::BufferFull),
                OverflowPolicy::BlockWithTimeout(timeout) => {
                    let deadline = Instant::now() + timeout;
                    while events.len() >= self.capacity {
                        if self.is_closed() {
                            return Err(BufferError::BufferClosed);
                        }
                        if self.space.wait_until(&mut events, deadline).timed_out()
                            && events.len() >= self.capacity
                        {
                            return Err(BufferError::SendTimeout);
                        }
                    }
                    if self.is_closed() {
                        return Err(BufferError::BufferClosed);
                    }
                }
            }
        }

        events.push_back(event);
        drop(events);

        self.available.notify_one();
        Ok(())
    }

    /// Take up to `max` events without waiting.
    pub fn try_drain(&self, max: usize) -> Vec<Arc<LogEvent>> {
        let mut events = self.events.lock();
        let take = events.len().min(max);
        let drained: Vec<_> = events.drain(..take).collect();
        drop(events);

        if !drained.is_empty() {
            self.space.notify_all();
        }
        drained
    }

    /// Wait until at least one event is queued, then take up to `max`.
    ///
    /// Returns an empty vector once the queue is closed and empty. Cancel
    /// safe: nothing is removed until the future completes.
    pub async fn recv_batch(&self, max: usize) -> Vec<Arc<LogEvent>> {
        loop {
            let notified = self.available.notified();
            let drained = self.try_drain(max);
            if !drained.is_empty() || self.is_closed() {
                return drained;
            }
            notified.await;
        }
    }

    /// Reject further pushes and wake everyone waiting on the queue.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Taking the lock orders the flag against blocked producers.
        drop(self.events.lock());
        self.space.notify_all();
        self.available.notify_one();
    }
}

impl std::fmt::Debug for IngressQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}
