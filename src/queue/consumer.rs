//! Consumer loop feeding one queue into the availability reconciler

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use super::{Delivery, MessageQueue, QueueError};
use crate::{
    config::QueueConfig,
    services::reconciler::{ReconcileOutcome, ReconcilerService},
};

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    Requeue,
    /// Nacked without requeue; the transport dead-letters it
    Reject,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub poll_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 0 retries forever
    pub max_reconnect_attempts: u32,
    /// Deliveries of an undecodable payload before it is rejected
    pub max_delivery_attempts: u32,
}

impl From<&QueueConfig> for ConsumerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            max_delivery_attempts: config.max_delivery_attempts,
        }
    }
}

pub struct LoanEventConsumer {
    queue_name: String,
    transport: Arc<dyn MessageQueue>,
    reconciler: ReconcilerService,
    settings: ConsumerSettings,
    /// Deliveries seen so far per undecodable payload
    malformed_attempts: Mutex<HashMap<Vec<u8>, u32>>,
}

impl LoanEventConsumer {
    pub fn new(
        queue_name: impl Into<String>,
        transport: Arc<dyn MessageQueue>,
        reconciler: ReconcilerService,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            transport,
            reconciler,
            settings,
            malformed_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Reconcile one delivery and settle it
    pub async fn process_delivery(&self, delivery: &Delivery) -> Result<Acknowledgement, QueueError> {
        match self.reconciler.handle_payload(&delivery.payload).await {
            Ok(ReconcileOutcome::Malformed { reason }) => {
                self.settle_malformed(delivery, &reason).await
            }
            Ok(_) => {
                self.transport.ack(delivery).await?;
                Ok(Acknowledgement::Ack)
            }
            Err(e) => {
                tracing::error!(queue = %self.queue_name, "Failed to process message, requeueing: {}", e);
                self.transport.nack(delivery, true).await?;
                Ok(Acknowledgement::Requeue)
            }
        }
    }

    /// Requeue an undecodable payload until it has been delivered
    /// `max_delivery_attempts` times, then reject it.
    async fn settle_malformed(
        &self,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<Acknowledgement, QueueError> {
        let attempt = {
            let mut attempts = self
                .malformed_attempts
                .lock()
                .map_err(|_| QueueError::Unavailable("attempt counter poisoned".to_string()))?;
            let count = attempts.entry(delivery.payload.clone()).or_insert(0);
            *count += 1;
            let attempt = *count;
            if attempt >= self.settings.max_delivery_attempts {
                attempts.remove(&delivery.payload);
            }
            attempt
        };
        let payload = String::from_utf8_lossy(&delivery.payload);

        if attempt >= self.settings.max_delivery_attempts {
            tracing::error!(
                queue = %self.queue_name,
                %payload,
                attempt,
                "Dead-lettering undecodable loan event: {}",
                reason
            );
            self.transport.nack(delivery, false).await?;
            return Ok(Acknowledgement::Reject);
        }

        tracing::warn!(
            queue = %self.queue_name,
            %payload,
            attempt,
            "Requeueing undecodable loan event: {}",
            reason
        );
        self.transport.nack(delivery, true).await?;
        Ok(Acknowledgement::Requeue)
    }

    /// Count a transport failure and wait out the backoff. Gives up with the
    /// error once `max_reconnect_attempts` failures happened in a row.
    async fn back_off(
        &self,
        error: QueueError,
        failures: &mut u32,
        backoff: &mut Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ControlFlow<()>, QueueError> {
        *failures += 1;
        if self.settings.max_reconnect_attempts > 0 && *failures >= self.settings.max_reconnect_attempts {
            tracing::error!(queue = %self.queue_name, "Giving up after {} transport failures: {}", failures, error);
            return Err(error);
        }
        tracing::warn!(
            queue = %self.queue_name,
            attempt = *failures,
            "Queue transport failure, retrying in {:?}: {}",
            backoff,
            error
        );
        let flow = tokio::select! {
            _ = tokio::time::sleep(*backoff) => ControlFlow::Continue(()),
            _ = shutdown.changed() => ControlFlow::Break(()),
        };
        *backoff = (*backoff * 2).min(self.settings.max_backoff);
        Ok(flow)
    }

    /// Consume until `shutdown` turns true, or until transport failures exceed
    /// `max_reconnect_attempts` in a row.
    ///
    /// Unsettled deliveries are put back on the queue at start and again after
    /// every transport failure, so a delivery whose ack or nack failed is
    /// processed again once the transport recovers.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        tracing::info!(queue = %self.queue_name, "Waiting for loan events");

        let mut failures: u32 = 0;
        let mut backoff = self.settings.initial_backoff;
        let mut needs_recovery = true;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if needs_recovery {
                match self.transport.recover(&self.queue_name).await {
                    Ok(moved) => {
                        if moved > 0 {
                            tracing::info!(queue = %self.queue_name, "Requeued {} unsettled message(s)", moved);
                        }
                        needs_recovery = false;
                    }
                    Err(e) => {
                        match self.back_off(e, &mut failures, &mut backoff, &mut shutdown).await? {
                            ControlFlow::Continue(()) => continue,
                            ControlFlow::Break(()) => break,
                        }
                    }
                }
            }

            let received = tokio::select! {
                received = self.transport.receive(&self.queue_name, self.settings.poll_timeout) => received,
                _ = shutdown.changed() => break,
            };

            let result = match received {
                Ok(Some(delivery)) => self.process_delivery(&delivery).await.map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };

            match result {
                Ok(settled) => {
                    failures = 0;
                    backoff = self.settings.initial_backoff;
                    if settled == Some(Acknowledgement::Requeue) {
                        // Give the store a moment before the message comes straight back.
                        tokio::time::sleep(self.settings.initial_backoff).await;
                    }
                }
                Err(e) => {
                    needs_recovery = true;
                    match self.back_off(e, &mut failures, &mut backoff, &mut shutdown).await? {
                        ControlFlow::Continue(()) => {}
                        ControlFlow::Break(()) => break,
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue_name, "Consumer stopped");
        Ok(())
    }
}
