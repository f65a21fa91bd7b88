//! Book model and request types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const REQUIRED_FIELDS: &str = "Title and author are required";

/// Book record as stored in the `books` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    /// Unique across all books when present
    pub isbn: Option<String>,
    /// Whether the book can currently be borrowed
    pub availability: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book search filters (substring, case-insensitive)
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
}

impl BookQuery {
    /// Title filter, ignoring empty values
    pub fn title_filter(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// Author filter, ignoring empty values
    pub fn author_filter(&self) -> Option<&str> {
        self.author.as_deref().filter(|a| !a.is_empty())
    }
}

/// Create book request.
///
/// `title` and `author` are optional at the wire level so that a missing
/// field is reported as a validation error instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(
        required(message = "Title and author are required"),
        length(min = 1, message = "Title and author are required")
    )]
    pub title: Option<String>,
    #[validate(
        required(message = "Title and author are required"),
        length(min = 1, message = "Title and author are required")
    )]
    pub author: Option<String>,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    /// Defaults to `true`
    pub availability: Option<bool>,
}

impl CreateBook {
    /// Trim text fields; an empty ISBN counts as no ISBN.
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            author: self.author.map(|a| a.trim().to_string()),
            isbn: normalize_isbn(self.isbn),
            ..self
        }
    }

    /// Validate and convert into an insertable record
    pub fn into_new_book(self) -> Result<NewBook, validator::ValidationErrors> {
        self.validate()?;
        match (self.title, self.author) {
            (Some(title), Some(author)) => Ok(NewBook {
                title,
                author,
                published_year: self.published_year,
                isbn: self.isbn,
                availability: self.availability.unwrap_or(true),
            }),
            _ => {
                let mut errors = validator::ValidationErrors::new();
                errors.add(
                    "title",
                    validator::ValidationError::new("required").with_message(REQUIRED_FIELDS.into()),
                );
                Err(errors)
            }
        }
    }
}

/// Validated book ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    pub availability: bool,
}

/// Update book request. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    pub availability: Option<bool>,
}

impl UpdateBook {
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            author: self.author.map(|a| a.trim().to_string()),
            isbn: normalize_isbn(self.isbn),
            ..self
        }
    }
}

fn normalize_isbn(isbn: Option<String>) -> Option<String> {
    isbn.map(|i| i.trim().to_string()).filter(|i| !i.is_empty())
}

/// Availability check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResponse {
    pub availability: bool,
}

/// Result of a conditional availability write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityChange {
    /// The flag held the expected value and was overwritten
    Updated,
    /// The flag did not hold the expected value; nothing was written
    Unchanged { current: bool },
    /// No book with this id
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_title_and_author() {
        let missing_author = CreateBook {
            title: Some("Dune".into()),
            ..Default::default()
        };
        let err = missing_author.normalized().into_new_book().unwrap_err();
        assert!(err.field_errors().contains_key("author"));

        let blank_title = CreateBook {
            title: Some("   ".into()),
            author: Some("Herbert".into()),
            ..Default::default()
        };
        let err = blank_title.normalized().into_new_book().unwrap_err();
        assert!(err.field_errors().contains_key("title"));
    }

    #[test]
    fn create_defaults_availability_and_drops_empty_isbn() {
        let book = CreateBook {
            title: Some(" Dune ".into()),
            author: Some("Herbert".into()),
            isbn: Some("  ".into()),
            ..Default::default()
        }
        .normalized()
        .into_new_book()
        .unwrap();

        assert_eq!(book.title, "Dune");
        assert!(book.availability);
        assert_eq!(book.isbn, None);
    }

    #[test]
    fn update_rejects_blank_title_but_allows_omission() {
        let blank = UpdateBook {
            title: Some("".into()),
            ..Default::default()
        };
        assert!(blank.normalized().validate().is_err());
        assert!(UpdateBook::default().validate().is_ok());
    }

    #[test]
    fn query_ignores_empty_filters() {
        let query = BookQuery {
            title: Some(String::new()),
            author: Some("Herb".into()),
        };
        assert_eq!(query.title_filter(), None);
        assert_eq!(query.author_filter(), Some("Herb"));
    }
}
