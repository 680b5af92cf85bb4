//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{
        BorrowingDetails, BorrowingFilter, BorrowingStats, CreateBorrowing, UpdateBorrowing,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Create borrowing request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowingRequest {
    /// Borrower. Required for staff; members always borrow for themselves.
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    /// Due date (YYYY-MM-DD or RFC 3339), today or later
    pub due_date: Option<String>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// List all borrowings
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingFilter),
    responses(
        (status = 200, description = "Borrowings, newest first", body = Vec<BorrowingDetails>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Admin or librarian required")
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Query(filter), _): WithRejection<Query<BorrowingFilter>, AppError>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    claims.require_staff()?;

    let borrowings = state.services.borrowing_queries.list(&filter).await?;
    Ok(Json(borrowings))
}

/// Borrowings of the authenticated user
#[utoipa::path(
    get,
    path = "/borrowings/my-borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's borrowings, newest first", body = Vec<BorrowingDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state.services.borrowing_queries.list_by_user(claims.id).await?;
    Ok(Json(borrowings))
}

/// Get a borrowing by ID
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing", body = BorrowingDetails),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowing_queries.get(id).await?;
    claims.require_owner_or_staff(borrowing.borrowing.user_id)?;
    Ok(Json(borrowing))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowingRequest,
    responses(
        (status = 201, description = "Borrowing created", body = BorrowingDetails),
        (status = 400, description = "Missing or invalid fields"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "Active loan exists or no copy available"),
        (status = 500, description = "Ledger inconsistency")
    )
)]
pub async fn create_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Json(request), _): WithRejection<Json<CreateBorrowingRequest>, AppError>,
) -> AppResult<(StatusCode, Json<BorrowingDetails>)> {
    request.validate()?;

    // Members cannot borrow on someone else's behalf
    let user_id = if claims.is_staff() {
        request.user_id.ok_or_else(|| {
            AppError::Validation("user_id, book_id and due_date are required".to_string())
        })?
    } else {
        claims.id
    };

    let borrowing = state
        .services
        .borrowings
        .create(CreateBorrowing {
            user_id,
            book_id: request.book_id,
            due_date: request.due_date,
            notes: request.notes,
        })
        .await?;

    let details = state.services.borrowing_queries.get(borrowing.id).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Return a borrowed book
#[utoipa::path(
    patch,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = BorrowingDetails),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Already returned"),
        (status = 500, description = "Ledger inconsistency")
    )
)]
pub async fn return_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<BorrowingDetails>> {
    let current = state.services.borrowing_queries.get(id).await?;
    claims.require_owner_or_staff(current.borrowing.user_id)?;

    let returned = state.services.borrowings.return_borrowing(id).await?;
    Ok(Json(returned))
}

/// Correct a borrowing (admin/librarian)
#[utoipa::path(
    patch,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    request_body = UpdateBorrowing,
    responses(
        (status = 200, description = "Borrowing updated", body = BorrowingDetails),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Admin or librarian required"),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "Status change not allowed")
    )
)]
pub async fn update_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateBorrowing>, AppError>,
) -> AppResult<Json<BorrowingDetails>> {
    claims.require_staff()?;
    request.validate()?;

    state.services.borrowings.update(id, request).await?;
    let details = state.services.borrowing_queries.get(id).await?;
    Ok(Json(details))
}

/// Delete a borrowing (admin/librarian)
#[utoipa::path(
    delete,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing deleted", body = MessageResponse),
        (status = 403, description = "Admin or librarian required"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn delete_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    claims.require_staff()?;

    state.services.borrowings.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Borrowing deleted successfully".to_string(),
    }))
}

/// Overdue borrowings
#[utoipa::path(
    get,
    path = "/borrowings/overdue/list",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active borrowings past due, earliest first", body = Vec<BorrowingDetails>),
        (status = 403, description = "Admin or librarian required")
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    claims.require_staff()?;

    let borrowings = state.services.borrowing_queries.list_overdue().await?;
    Ok(Json(borrowings))
}

/// Borrowing statistics
#[utoipa::path(
    get,
    path = "/borrowings/stats/overview",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowing counts", body = BorrowingStats),
        (status = 403, description = "Admin or librarian required")
    )
)]
pub async fn stats_overview(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowingStats>> {
    claims.require_staff()?;

    let stats = state.services.borrowing_queries.stats().await?;
    Ok(Json(stats))
}
