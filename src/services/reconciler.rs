//! Availability reconciliation for loan lifecycle events.
//!
//! A loan event flips a book's availability only when the book is in the
//! state the event expects (available before a loan, unavailable before a
//! return). The check and the write happen in one conditional store update,
//! so concurrent events and API writes on the same book cannot interleave
//! between them.
//!
//! Logical inconsistencies (unknown book, book already in the target state)
//! are reported as outcomes and never retried. An undecodable payload is
//! reported as `Malformed` and left to the consumer to settle. Store failures
//! surface as errors so the delivery can be requeued.

use std::sync::Arc;
use std::time::Duration;

use super::with_timeout;
use crate::{
    error::AppResult,
    models::{
        book::AvailabilityChange,
        loan_event::{LoanEvent, LoanEventKind},
    },
    repository::BookStore,
};

/// How a loan event was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Availability was flipped
    Applied { event: LoanEvent, availability: bool },
    /// The book already had the availability the event would produce
    AlreadyInState { event: LoanEvent, availability: bool },
    UnknownBook { event: LoanEvent },
    /// The payload could not be decoded into a loan event
    Malformed { reason: String },
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

#[derive(Clone)]
pub struct ReconcilerService {
    store: Arc<dyn BookStore>,
    timeout: Duration,
}

impl ReconcilerService {
    pub fn new(store: Arc<dyn BookStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Decode a raw queue payload and apply it
    pub async fn handle_payload(&self, payload: &[u8]) -> AppResult<ReconcileOutcome> {
        match LoanEvent::from_payload(payload) {
            Ok(event) => self.apply(event).await,
            Err(e) => Ok(ReconcileOutcome::Malformed {
                reason: e.to_string(),
            }),
        }
    }

    /// Apply a loan event to the book it references
    pub async fn apply(&self, event: LoanEvent) -> AppResult<ReconcileOutcome> {
        let expected = event.kind.expected_availability();
        let target = event.kind.resulting_availability();

        let change = with_timeout(
            self.timeout,
            "set availability",
            self.store.set_availability_if(event.book_id, expected, target),
        )
        .await?;

        let outcome = match change {
            AvailabilityChange::Updated => {
                tracing::info!(
                    book_id = event.book_id,
                    kind = ?event.kind,
                    "Book availability updated to {}",
                    target
                );
                ReconcileOutcome::Applied {
                    event,
                    availability: target,
                }
            }
            AvailabilityChange::Unchanged { current } => {
                let state = match event.kind {
                    LoanEventKind::LoanCreated => "already on loan",
                    LoanEventKind::LoanFinished => "already available",
                };
                tracing::warn!(
                    book_id = event.book_id,
                    kind = ?event.kind,
                    "Ignoring loan event: book is {}",
                    state
                );
                ReconcileOutcome::AlreadyInState {
                    event,
                    availability: current,
                }
            }
            AvailabilityChange::Missing => {
                tracing::warn!(
                    book_id = event.book_id,
                    kind = ?event.kind,
                    "Ignoring loan event: book not found"
                );
                ReconcileOutcome::UnknownBook { event }
            }
        };

        Ok(outcome)
    }
}
