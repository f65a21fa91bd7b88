//! Data models for the book catalog

pub mod book;
pub mod loan_event;

// Re-export commonly used types
pub use book::{Book, BookQuery, CreateBook, NewBook, UpdateBook};
pub use loan_event::{LoanEvent, LoanEventKind};
