//! API integration tests against a running server

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:3000";

/// Unique ISBN per run so reruns against the same database do not collide
fn unique_isbn() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .subsec_nanos();
    format!("T{}", nanos)
}

/// Helper to create a book and return its id
async fn create_book(client: &Client, title: &str, isbn: &str) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .json(&json!({
            "title": title,
            "author": "Integration",
            "isbn": isbn
        }))
        .send()
        .await
        .expect("Failed to send create request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse create response");
    body["book_id"].as_i64().expect("No book_id in response")
}

async fn delete_book(client: &Client, id: i64) {
    let _ = client
        .delete(format!("{}/books/{}", BASE_URL, id))
        .send()
        .await;
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_create_and_search_book() {
    let client = Client::new();
    let isbn = unique_isbn();
    let title = format!("Dune {}", isbn);
    let id = create_book(&client, &title, &isbn).await;

    let response = client
        .get(format!("{}/books", BASE_URL))
        .query(&[("title", title.as_str())])
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    let books = body.as_array().expect("Expected an array");
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["availability"], true);

    delete_book(&client, id).await;
}

#[tokio::test]
#[ignore]
async fn test_duplicate_isbn_rejected() {
    let client = Client::new();
    let isbn = unique_isbn();
    let id = create_book(&client, "Original", &isbn).await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .json(&json!({"title": "Copy", "author": "Someone", "isbn": isbn}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);

    delete_book(&client, id).await;
}

#[tokio::test]
#[ignore]
async fn test_missing_fields_rejected() {
    let client = Client::new();

    let response = client
        .post(format!("{}/books", BASE_URL))
        .json(&json!({"author": "No Title"}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_update_and_availability() {
    let client = Client::new();
    let isbn = unique_isbn();
    let id = create_book(&client, "Emma", &isbn).await;

    let response = client
        .put(format!("{}/books/{}", BASE_URL, id))
        .json(&json!({"availability": false}))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/books/{}/availability", BASE_URL, id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["availability"], false);

    delete_book(&client, id).await;
}

#[tokio::test]
#[ignore]
async fn test_unknown_book_not_found() {
    let client = Client::new();

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, i32::MAX))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
}
