//! Loan lifecycle events published by the loan-management system.
//!
//! The loan system historically encodes the event kind in the field name
//! (`LivreID` for a new loan, `livreId` for a returned one). Both that legacy
//! shape and an explicit tagged shape decode into [`LoanEvent`]:
//!
//! ```json
//! {"LivreID": 5}
//! {"livreId": "5"}
//! {"kind": "loan_created", "book_id": 5}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened to the loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanEventKind {
    /// The book was borrowed
    LoanCreated,
    /// The book was returned
    LoanFinished,
}

impl LoanEventKind {
    /// Availability the book must have for the event to apply
    pub fn expected_availability(self) -> bool {
        match self {
            LoanEventKind::LoanCreated => true,
            LoanEventKind::LoanFinished => false,
        }
    }

    /// Availability after the event applies
    pub fn resulting_availability(self) -> bool {
        !self.expected_availability()
    }
}

/// A decoded loan event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoanEvent {
    pub kind: LoanEventKind,
    pub book_id: i32,
}

#[derive(Debug, Error)]
pub enum LoanEventError {
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload carries both LivreID and livreId")]
    Ambiguous,

    #[error("payload carries no book identifier")]
    MissingBookId,

    #[error("invalid book identifier: {0}")]
    InvalidBookId(String),
}

/// Book ids arrive either as JSON numbers or numeric strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBookId {
    Number(i64),
    Text(String),
}

impl RawBookId {
    fn into_id(self) -> Result<i32, LoanEventError> {
        let value = match self {
            RawBookId::Number(n) => n,
            RawBookId::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| LoanEventError::InvalidBookId(s.clone()))?,
        };
        i32::try_from(value).map_err(|_| LoanEventError::InvalidBookId(value.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Tagged {
        kind: LoanEventKind,
        book_id: RawBookId,
    },
    Legacy {
        #[serde(rename = "LivreID")]
        loan_created: Option<RawBookId>,
        #[serde(rename = "livreId")]
        loan_finished: Option<RawBookId>,
    },
}

impl LoanEvent {
    pub fn new(kind: LoanEventKind, book_id: i32) -> Self {
        Self { kind, book_id }
    }

    /// Decode a raw queue payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, LoanEventError> {
        match serde_json::from_slice::<WirePayload>(payload)? {
            WirePayload::Tagged { kind, book_id } => Ok(Self::new(kind, book_id.into_id()?)),
            WirePayload::Legacy {
                loan_created,
                loan_finished,
            } => match (loan_created, loan_finished) {
                (Some(id), None) => Ok(Self::new(LoanEventKind::LoanCreated, id.into_id()?)),
                (None, Some(id)) => Ok(Self::new(LoanEventKind::LoanFinished, id.into_id()?)),
                (Some(_), Some(_)) => Err(LoanEventError::Ambiguous),
                (None, None) => Err(LoanEventError::MissingBookId),
            },
        }
    }

    /// Encode in the tagged shape
    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::json!({ "kind": self.kind, "book_id": self.book_id })
            .to_string()
            .into_bytes()
    }
}
