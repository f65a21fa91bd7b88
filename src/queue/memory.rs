//! In-process queue with the same settlement semantics as the Redis queue

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Delivery, MessageQueue, QueueError};

#[derive(Default)]
struct Lists {
    ready: VecDeque<Vec<u8>>,
    in_flight: Vec<Vec<u8>>,
    dead: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, Lists>>,
    published: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> Result<MutexGuard<'_, HashMap<String, Lists>>, QueueError> {
        self.queues
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".to_string()))
    }

    pub fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) -> Result<(), QueueError> {
        self.queues()?
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(payload.into());
        self.published.notify_waiters();
        Ok(())
    }

    /// Messages waiting to be received
    pub fn ready_len(&self, queue: &str) -> usize {
        self.queues()
            .map(|q| q.get(queue).map_or(0, |l| l.ready.len()))
            .unwrap_or(0)
    }

    /// Messages received but not yet settled
    pub fn in_flight_len(&self, queue: &str) -> usize {
        self.queues()
            .map(|q| q.get(queue).map_or(0, |l| l.in_flight.len()))
            .unwrap_or(0)
    }

    /// Messages rejected without requeue
    pub fn dead_len(&self, queue: &str) -> usize {
        self.queues()
            .map(|q| q.get(queue).map_or(0, |l| l.dead.len()))
            .unwrap_or(0)
    }

    fn take(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut queues = self.queues()?;
        let lists = queues.entry(queue.to_string()).or_default();
        Ok(lists.ready.pop_front().map(|payload| {
            lists.in_flight.push(payload.clone());
            Delivery {
                queue: queue.to_string(),
                payload,
                tag: 0,
            }
        }))
    }

    fn settle(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut queues = self.queues()?;
        let lists = queues.entry(delivery.queue.clone()).or_default();
        if let Some(pos) = lists.in_flight.iter().position(|p| *p == delivery.payload) {
            let payload = lists.in_flight.remove(pos);
            if requeue {
                lists.ready.push_front(payload);
            } else {
                lists.dead.push(payload);
            }
        }
        drop(queues);
        if requeue {
            self.published.notify_waiters();
        }
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        let mut queues = self.queues()?;
        let lists = queues.entry(queue.to_string()).or_default();
        let moved = lists.in_flight.len() as u64;
        for payload in lists.in_flight.drain(..).rev() {
            lists.ready.push_front(payload);
        }
        Ok(moved)
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a concurrent publish is not missed.
            let published = self.published.notified();
            if let Some(delivery) = self.take(queue)? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, published).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle(delivery, false)
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        self.settle(delivery, requeue)
    }
}
