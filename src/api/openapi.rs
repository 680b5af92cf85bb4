//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrowings, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Biblio API",
        version = "0.1.0",
        description = "Library borrowing and returns REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrowings
        borrowings::list_borrowings,
        borrowings::my_borrowings,
        borrowings::get_borrowing,
        borrowings::create_borrowing,
        borrowings::return_borrowing,
        borrowings::update_borrowing,
        borrowings::delete_borrowing,
        borrowings::list_overdue,
        borrowings::stats_overview,
    ),
    components(
        schemas(
            // Borrowings
            borrowings::CreateBorrowingRequest,
            borrowings::MessageResponse,
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowingFilter,
            crate::models::borrowing::BorrowingStats,
            crate::models::borrowing::UpdateBorrowing,
            crate::models::book::BookSummary,
            crate::models::user::UserSummary,
            crate::models::user::Role,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrowings", description = "Borrowing lifecycle and reports")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_borrowing_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/borrowings"));
        assert!(doc.paths.paths.contains_key("/borrowings/{id}/return"));
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth")));
    }
}
