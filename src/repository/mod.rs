//! Repository layer for book persistence

pub mod books;
pub mod memory;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::book::{AvailabilityChange, Book, BookQuery, NewBook, UpdateBook},
};

pub use books::PgBookStore;
pub use memory::InMemoryBookStore;

/// Durable store of book records, shared by the HTTP handlers and the
/// availability reconciler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Books whose title and author contain the given filters (case-insensitive)
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<Book>>;

    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// Insert a book. A taken ISBN yields `AppError::Conflict`.
    async fn create(&self, book: &NewBook) -> AppResult<Book>;

    /// Overwrite the provided fields, keeping the others. `None` if absent.
    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Option<Book>>;

    /// Returns whether a row was removed
    async fn delete(&self, id: i32) -> AppResult<bool>;

    /// Set `availability` to `new` only if it currently equals `expected`.
    async fn set_availability_if(
        &self,
        id: i32,
        expected: bool,
        new: bool,
    ) -> AppResult<AvailabilityChange>;

    /// Connectivity check for the readiness endpoint
    async fn ping(&self) -> AppResult<()>;
}

/// Escape LIKE wildcards so filters match literally
pub(crate) fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Dune"), "%Dune%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }
}
