//! Catalog management service

use std::sync::Arc;
use std::time::Duration;

use validator::Validate;

use super::with_timeout;
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
    repository::BookStore,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn BookStore>,
    timeout: Duration,
}

fn book_not_found() -> AppError {
    AppError::NotFound("Book not found".to_string())
}

impl CatalogService {
    pub fn new(store: Arc<dyn BookStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Search books by title and author fragments
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let books = with_timeout(self.timeout, "list books", self.store.list(query)).await?;
        if books.is_empty() {
            return Err(AppError::NotFound("No books found".to_string()));
        }
        Ok(books)
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        with_timeout(self.timeout, "get book", self.store.get(id))
            .await?
            .ok_or_else(book_not_found)
    }

    /// Create a new book, rejecting duplicate ISBNs
    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        let book = data.normalized().into_new_book()?;

        if let Some(isbn) = &book.isbn {
            let existing =
                with_timeout(self.timeout, "find book by isbn", self.store.find_by_isbn(isbn))
                    .await?;
            if existing.is_some() {
                return Err(AppError::Conflict(
                    "Book with this ISBN already exists".to_string(),
                ));
            }
        }

        let created = with_timeout(self.timeout, "create book", self.store.create(&book)).await?;
        tracing::info!(book_id = created.id, "Book created");
        Ok(created)
    }

    /// Update a book. Fields left out of `data` keep their current value.
    pub async fn update_book(&self, id: i32, data: UpdateBook) -> AppResult<Book> {
        let changes = data.normalized();
        changes.validate()?;

        let updated = with_timeout(self.timeout, "update book", self.store.update(id, &changes))
            .await?
            .ok_or_else(book_not_found)?;
        tracing::info!(book_id = id, "Book updated");
        Ok(updated)
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let removed = with_timeout(self.timeout, "delete book", self.store.delete(id)).await?;
        if !removed {
            return Err(book_not_found());
        }
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    pub async fn availability(&self, id: i32) -> AppResult<bool> {
        Ok(self.get_book(id).await?.availability)
    }

    /// Store connectivity check
    pub async fn ping(&self) -> AppResult<()> {
        with_timeout(self.timeout, "ping", self.store.ping()).await
    }
}
