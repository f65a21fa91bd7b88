//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Book Catalog API",
        version = "0.1.0",
        description = "Book catalog with loan-driven availability",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::get_availability,
    ),
    components(
        schemas(
            crate::models::book::Book,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::AvailabilityResponse,
            books::MessageResponse,
            books::BookCreatedResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog management")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
