//! API handlers for the book catalog REST endpoints

pub mod books;
pub mod health;
pub mod openapi;

use axum::{extract::FromRequest, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, AppState};

/// JSON body extractor whose rejections use the `{error, message}` envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/availability", get(books::get_availability))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    use super::*;
    use crate::{
        config::AppConfig,
        models::loan_event::{LoanEvent, LoanEventKind},
        repository::InMemoryBookStore,
        services::Services,
    };

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryBookStore::new());
        AppState {
            config: Arc::new(AppConfig::default()),
            services: Arc::new(Services::new(store, Duration::from_secs(1))),
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn create_then_search_by_title() {
        let app = create_router(test_state());

        let (status, body) = send(
            &app,
            "POST",
            "/books",
            Some(json!({"title": "Dune", "author": "Herbert", "isbn": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Book added successfully");
        let id = body["book_id"].as_i64().unwrap();

        let (status, body) = send(&app, "GET", "/books?title=Dune", None).await;
        assert_eq!(status, StatusCode::OK);
        let books = body.as_array().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["id"].as_i64(), Some(id));
        assert_eq!(books[0]["availability"], true);
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let app = create_router(test_state());
        let (status, body) = send(&app, "GET", "/books?author=Nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No books found");
    }

    #[tokio::test]
    async fn missing_fields_and_duplicate_isbn_are_bad_requests() {
        let app = create_router(test_state());

        let (status, body) = send(&app, "POST", "/books", Some(json!({"title": "Dune"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["message"], "Title and author are required");

        let dune = json!({"title": "Dune", "author": "Herbert", "isbn": "123"});
        send(&app, "POST", "/books", Some(dune.clone())).await;
        let (status, body) = send(&app, "POST", "/books", Some(dune)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ConflictError");

        let (_, body) = send(&app, "GET", "/books", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_bodies_are_validation_errors() {
        let app = create_router(test_state());

        let (status, body) = send(
            &app,
            "POST",
            "/books",
            Some(json!({"title": 5, "author": "Herbert"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let request = Request::builder()
            .method("POST")
            .uri("/books")
            .body(Body::from(r#"{"title": "Dune", "author": "Herbert"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "ValidationError");

        let (status, body) = send(&app, "PUT", "/books/1", Some(json!({"availability": "no"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let (_, body) = send(&app, "GET", "/books", None).await;
        assert_eq!(body["message"], "No books found");
    }

    #[tokio::test]
    async fn unknown_ids_return_not_found() {
        let app = create_router(test_state());

        let (status, _) = send(&app, "PUT", "/books/42", Some(json!({"title": "X"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", "/books/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, "GET", "/books/42/availability", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Book not found");
    }

    #[tokio::test]
    async fn update_delete_and_availability() {
        let app = create_router(test_state());
        let (_, body) = send(
            &app,
            "POST",
            "/books",
            Some(json!({"title": "Emma", "author": "Austen", "published_year": 1815})),
        )
        .await;
        let id = body["book_id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/books/{}", id),
            Some(json!({"availability": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Book updated successfully");

        let (_, body) = send(&app, "GET", &format!("/books/{}", id), None).await;
        assert_eq!(body["title"], "Emma");
        assert_eq!(body["published_year"], 1815);

        let (status, body) = send(&app, "GET", &format!("/books/{}/availability", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"availability": false}));

        let (status, body) = send(&app, "DELETE", &format!("/books/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Book deleted successfully");
        let (status, _) = send(&app, "GET", &format!("/books/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn loan_events_show_up_in_availability() {
        let state = test_state();
        let app = create_router(state.clone());
        let (_, body) = send(
            &app,
            "POST",
            "/books",
            Some(json!({"title": "Dune", "author": "Herbert"})),
        )
        .await;
        let id = body["book_id"].as_i64().unwrap() as i32;
        let uri = format!("/books/{}/availability", id);

        let created = format!(r#"{{"LivreID": {}}}"#, id);
        state.services.reconciler.handle_payload(created.as_bytes()).await.unwrap();
        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["availability"], false);

        let finished = LoanEvent::new(LoanEventKind::LoanFinished, id).to_payload();
        state.services.reconciler.handle_payload(&finished).await.unwrap();
        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["availability"], true);
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let app = create_router(test_state());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }
}
