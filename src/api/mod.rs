//! API handlers for Biblio REST endpoints

pub mod borrowings;
pub mod health;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
    routing::{get, patch},
    RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::CorsConfig, error::AppError, models::user::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing or malformed bearer token".to_string()))?;

        let claims = UserClaims::from_token(bearer.token(), &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Borrowings
        .route(
            "/borrowings",
            get(borrowings::list_borrowings).post(borrowings::create_borrowing),
        )
        .route("/borrowings/my-borrowings", get(borrowings::my_borrowings))
        .route("/borrowings/overdue/list", get(borrowings::list_overdue))
        .route("/borrowings/stats/overview", get(borrowings::stats_overview))
        .route(
            "/borrowings/:id",
            get(borrowings::get_borrowing)
                .patch(borrowings::update_borrowing)
                .delete(borrowings::delete_borrowing),
        )
        .route("/borrowings/:id/return", patch(borrowings::return_borrowing))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origin == "*" {
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                origin = %config.allowed_origin,
                "Invalid CORS origin, cross-origin requests will be refused"
            );
            layer
        }
    }
}
