// ============================================================================
// Outbound Queue
// Bounded per-connection queue with drop-oldest overflow
// ============================================================================

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

/// Result of pushing onto an outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Queue was full; the returned oldest message was discarded
    DroppedOldest(String),
    /// Queue closed; the message was not accepted
    Closed,
}

/// Many producers, one consumer (the connection's writer loop).
///
/// A slow client never blocks senders and never grows the queue past its
/// capacity: on overflow the oldest undelivered message is discarded.
/// Closing wakes the writer, which drains nothing further and exits.
#[derive(Debug)]
pub struct OutboundQueue {
    queue: ArrayQueue<String>,
    ready: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, message: String) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        let outcome = match self.queue.force_push(message) {
            None => PushOutcome::Enqueued,
            Some(evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::DroppedOldest(evicted)
            },
        };
        self.ready.notify_one();
        outcome
    }

    pub fn try_pop(&self) -> Option<String> {
        self.queue.pop()
    }

    /// Next message, or `None` once the queue is closed.
    ///
    /// Cancel-safe: a message is only taken in the same poll that returns it.
    pub async fn next(&self) -> Option<String> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(message) = self.queue.pop() {
                return Some(message);
            }
            self.ready.notified().await;
        }
    }

    /// Idempotent
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.ready.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Messages discarded by overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
