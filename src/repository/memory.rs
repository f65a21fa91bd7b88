//! In-memory book store, used by tests and local runs without Postgres

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::BookStore;
use crate::{
    error::{AppError, AppResult},
    models::book::{AvailabilityChange, Book, BookQuery, NewBook, UpdateBook},
};

#[derive(Default)]
struct Table {
    rows: BTreeMap<i32, Book>,
    next_id: i32,
}

impl Table {
    fn isbn_taken(&self, isbn: &str, except: Option<i32>) -> bool {
        self.rows
            .values()
            .any(|b| b.isbn.as_deref() == Some(isbn) && Some(b.id) != except)
    }
}

#[derive(Default)]
pub struct InMemoryBookStore {
    table: Mutex<Table>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> AppResult<std::sync::MutexGuard<'_, Table>> {
        self.table
            .lock()
            .map_err(|_| AppError::Internal("book table lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.table().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let table = self.table()?;
        Ok(table
            .rows
            .values()
            .filter(|b| contains_ci(&b.title, query.title_filter()))
            .filter(|b| contains_ci(&b.author, query.author_filter()))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.table()?.rows.get(&id).cloned())
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let table = self.table()?;
        Ok(table
            .rows
            .values()
            .find(|b| b.isbn.as_deref() == Some(isbn))
            .cloned())
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let mut table = self.table()?;
        if let Some(isbn) = &book.isbn {
            if table.isbn_taken(isbn, None) {
                return Err(AppError::Conflict(
                    "Book with this ISBN already exists".to_string(),
                ));
            }
        }

        table.next_id += 1;
        let now = Utc::now();
        let row = Book {
            id: table.next_id,
            title: book.title.clone(),
            author: book.author.clone(),
            published_year: book.published_year,
            isbn: book.isbn.clone(),
            availability: book.availability,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Option<Book>> {
        let mut table = self.table()?;
        if !table.rows.contains_key(&id) {
            return Ok(None);
        }
        if let Some(isbn) = &changes.isbn {
            if table.isbn_taken(isbn, Some(id)) {
                return Err(AppError::Conflict(
                    "Book with this ISBN already exists".to_string(),
                ));
            }
        }

        let Some(book) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = &changes.title {
            book.title = title.clone();
        }
        if let Some(author) = &changes.author {
            book.author = author.clone();
        }
        if let Some(year) = changes.published_year {
            book.published_year = Some(year);
        }
        if let Some(isbn) = &changes.isbn {
            book.isbn = Some(isbn.clone());
        }
        if let Some(availability) = changes.availability {
            book.availability = availability;
        }
        book.updated_at = Utc::now();
        Ok(Some(book.clone()))
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        Ok(self.table()?.rows.remove(&id).is_some())
    }

    async fn set_availability_if(
        &self,
        id: i32,
        expected: bool,
        new: bool,
    ) -> AppResult<AvailabilityChange> {
        let mut table = self.table()?;
        Ok(match table.rows.get_mut(&id) {
            None => AvailabilityChange::Missing,
            Some(book) if book.availability != expected => AvailabilityChange::Unchanged {
                current: book.availability,
            },
            Some(book) => {
                book.availability = new;
                book.updated_at = Utc::now();
                AvailabilityChange::Updated
            }
        })
    }

    async fn ping(&self) -> AppResult<()> {
        self.table().map(|_| ())
    }
}
