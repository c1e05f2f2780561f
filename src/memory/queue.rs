// ============================================================================
// In-Memory Booking Queue
// Single-partition topic with one consumer group and redelivery on non-ack
// ============================================================================

use crate::error::QueueError;
use crate::interfaces::{BookingQueue, QueueMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

const PARTITION: u32 = 0;

#[derive(Debug, Default)]
struct TopicState {
    log: Vec<Vec<u8>>,
    /// Next never-delivered offset for the group
    next_offset: u64,
    /// Delivered but not acknowledged: offset -> redelivery deadline
    in_flight: BTreeMap<u64, Instant>,
    injected_errors: VecDeque<QueueError>,
    closed: bool,
}

#[derive(Debug)]
struct TopicInner {
    state: Mutex<TopicState>,
    published: Notify,
    redelivery_after: Duration,
}

/// Producer-side handle of an in-memory topic. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<TopicInner>,
}

impl MemoryQueue {
    /// `redelivery_after` is how long a delivered message may stay
    /// unacknowledged before it is handed out again
    pub fn new(redelivery_after: Duration) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                state: Mutex::new(TopicState::default()),
                published: Notify::new(),
                redelivery_after,
            }),
        }
    }

    /// Consumer bound to this topic's single consumer group
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Append a raw payload; returns its offset
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> u64 {
        let offset = {
            let mut state = self.inner.state.lock();
            state.log.push(payload.into());
            (state.log.len() - 1) as u64
        };
        self.inner.published.notify_one();
        offset
    }

    pub fn publish_json<T: Serialize>(&self, value: &T) -> Result<u64, serde_json::Error> {
        Ok(self.publish(serde_json::to_vec(value)?))
    }

    /// The next poll fails with `error` (queued in order)
    pub fn inject_error(&self, error: QueueError) {
        self.inner.state.lock().injected_errors.push_back(error);
        self.inner.published.notify_one();
    }

    /// Lowest offset not yet acknowledged by the group
    pub fn committed_offset(&self) -> u64 {
        let state = self.inner.state.lock();
        state
            .in_flight
            .keys()
            .next()
            .copied()
            .unwrap_or(state.next_offset)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

/// Consumer side; owned by the ingestion pipeline
#[derive(Debug)]
pub struct MemoryConsumer {
    inner: Arc<TopicInner>,
}

impl MemoryConsumer {
    /// Take the next deliverable message, or the instant at which the
    /// earliest in-flight message becomes redeliverable
    fn try_take(&self, now: Instant) -> Result<Result<QueueMessage, Option<Instant>>, QueueError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if let Some(error) = state.injected_errors.pop_front() {
            return Err(error);
        }

        let redelivery_deadline = now + self.inner.redelivery_after;

        let expired = state
            .in_flight
            .iter()
            .find(|(_, deadline)| **deadline <= now)
            .map(|(offset, _)| *offset);

        let offset = match expired {
            Some(offset) => offset,
            None if (state.next_offset as usize) < state.log.len() => {
                let offset = state.next_offset;
                state.next_offset += 1;
                offset
            },
            None => return Ok(Err(state.in_flight.values().min().copied())),
        };

        state.in_flight.insert(offset, redelivery_deadline);
        Ok(Ok(QueueMessage {
            partition: PARTITION,
            offset,
            payload: state.log[offset as usize].clone(),
        }))
    }
}

#[async_trait]
impl BookingQueue for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let wake_at = match self.try_take(Instant::now())? {
                Ok(message) => return Ok(Some(message)),
                Err(Some(redelivery)) => redelivery.min(deadline),
                Err(None) => deadline,
            };

            if wake_at <= Instant::now() && wake_at == deadline {
                return Ok(None);
            }

            let _ = tokio::time::timeout_at(wake_at, self.inner.published.notified()).await;

            if Instant::now() >= deadline {
                return match self.try_take(Instant::now())? {
                    Ok(message) => Ok(Some(message)),
                    Err(_) => Ok(None),
                };
            }
        }
    }

    async fn ack(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.in_flight.remove(&message.offset);
        Ok(())
    }

    async fn close(&mut self) {
        self.inner.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_delivers_in_order() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        let mut consumer = queue.consumer();
        queue.publish("a");
        queue.publish("b");

        let first = consumer.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = consumer.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.payload, b"a");
        assert_eq!(second.offset, 1);
        assert_eq!(queue.committed_offset(), 0);

        consumer.ack(&first).await.unwrap();
        consumer.ack(&second).await.unwrap();
        assert_eq!(queue.committed_offset(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_is_not_an_error() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        let mut consumer = queue.consumer();
        assert_eq!(consumer.poll(Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_wakes_on_publish() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        let mut consumer = queue.consumer();
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.publish("late");
        });
        let message = consumer.poll(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(message.payload, b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_message_is_redelivered() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        let mut consumer = queue.consumer();
        queue.publish("once");

        let first = consumer.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(consumer.poll(Duration::from_millis(10)).await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(31)).await;
        let again = consumer.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.offset, first.offset);
        assert_eq!(again.payload, first.payload);
    }

    #[tokio::test]
    async fn test_injected_errors_and_close() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        let mut consumer = queue.consumer();
        queue.inject_error(QueueError::BrokerUnavailable("down".into()));
        assert_eq!(
            consumer.poll(Duration::from_millis(10)).await,
            Err(QueueError::BrokerUnavailable("down".into()))
        );

        consumer.close().await;
        assert!(queue.is_closed());
        assert_eq!(
            consumer.poll(Duration::from_millis(10)).await,
            Err(QueueError::Closed)
        );
    }
}
