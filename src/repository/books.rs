//! Postgres-backed book store

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{like_pattern, BookStore};
use crate::{
    error::{AppError, AppResult},
    models::book::{AvailabilityChange, Book, BookQuery, NewBook, UpdateBook},
};

const DUPLICATE_ISBN: &str = "Book with this ISBN already exists";

#[derive(Clone)]
pub struct PgBookStore {
    pool: Pool<Postgres>,
}

impl PgBookStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Map a unique violation on `isbn` to a conflict, everything else to a database error
fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(DUPLICATE_ISBN.to_string())
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.title_filter().is_some() {
            conditions.push(format!("title ILIKE ${}", idx));
            idx += 1;
        }
        if query.author_filter().is_some() {
            conditions.push(format!("author ILIKE ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let select_q = format!("SELECT * FROM books {} ORDER BY id", where_clause);
        let mut builder = sqlx::query_as::<_, Book>(&select_q);
        if let Some(title) = query.title_filter() {
            builder = builder.bind(like_pattern(title));
        }
        if let Some(author) = query.author_filter() {
            builder = builder.bind(like_pattern(author));
        }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = $1")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, published_year, isbn, availability)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.published_year)
        .bind(&book.isbn)
        .bind(book.availability)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                published_year = COALESCE($4, published_year),
                isbn = COALESCE($5, isbn),
                availability = COALESCE($6, availability),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(changes.published_year)
        .bind(&changes.isbn)
        .bind(changes.availability)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_availability_if(
        &self,
        id: i32,
        expected: bool,
        new: bool,
    ) -> AppResult<AvailabilityChange> {
        let updated = sqlx::query(
            r#"
            UPDATE books SET availability = $3, updated_at = NOW()
            WHERE id = $1 AND availability = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(AvailabilityChange::Updated);
        }

        // The conditional write missed: either the row is gone or the flag differs.
        let current: Option<bool> =
            sqlx::query_scalar("SELECT availability FROM books WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            Some(current) => AvailabilityChange::Unchanged { current },
            None => AvailabilityChange::Missing,
        })
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
