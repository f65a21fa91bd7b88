//! Redis-backed reliable queue.
//!
//! Producers `LPUSH` onto the queue list. A receive atomically moves the
//! oldest entry into `<queue>:processing` with `BLMOVE` (Redis 6.2+), so a
//! consumer crash never loses a message: the entry stays in the processing
//! list until it is acked (`LREM`) or requeued. Rejected messages land in
//! `<queue>:dead`.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

use super::{Delivery, MessageQueue, QueueError};

fn processing_key(queue: &str) -> String {
    format!("{}:processing", queue)
}

fn dead_letter_key(queue: &str) -> String {
    format!("{}:dead", queue)
}

/// One connection per instance. A blocking receive occupies the connection,
/// so each consumer loop needs its own `RedisQueue`.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    /// Connect and verify the server answers
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        Ok(Self { conn })
    }

    /// Publish a message (used by tooling and tests; the loan system publishes in production)
    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let processing = processing_key(queue);
        let mut moved = 0;

        // Newest first from the processing list onto the consuming end, so the
        // oldest parked message ends up next in line.
        loop {
            let entry: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            match entry {
                Some(_) => moved += 1,
                None => break,
            }
        }

        Ok(moved)
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let payload: Option<Vec<u8>> = redis::cmd("BLMOVE")
            .arg(queue)
            .arg(processing_key(queue))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| Delivery {
            queue: queue.to_string(),
            payload,
            tag: 0,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("LREM")
            .arg(processing_key(&delivery.queue))
            .arg(1)
            .arg(&delivery.payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(processing_key(&delivery.queue))
            .arg(1)
            .arg(&delivery.payload)
            .ignore();
        let target = if requeue {
            pipe.cmd("RPUSH").arg(&delivery.queue)
        } else {
            pipe.cmd("LPUSH").arg(dead_letter_key(&delivery.queue))
        };
        target.arg(&delivery.payload).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
