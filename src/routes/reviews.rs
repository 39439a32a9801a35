use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_buyer, ensure_self_or_admin},
    models::Review,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i32>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub product_id: Option<Uuid>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ReviewList {
    pub items: Vec<Review>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route(
            "/{id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
}

#[utoipa::path(
    get,
    path = "/api/reviews",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("product_id" = Option<Uuid>, Query, description = "Filter by product")
    ),
    responses(
        (status = 200, description = "List reviews", body = ApiResponse<ReviewList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ReviewQuery>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let (page, limit, offset) = query.pagination.normalize();
    let (items, total) = match query.product_id {
        Some(product_id) => {
            let items = sqlx::query_as::<_, Review>(
                "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(product_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;
            let total: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE product_id = $1")
                    .bind(product_id)
                    .fetch_one(&state.pool)
                    .await?;
            (items, total.0)
        }
        None => {
            let items = sqlx::query_as::<_, Review>(
                "SELECT * FROM reviews ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;
            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews")
                .fetch_one(&state.pool)
                .await?;
            (items, total.0)
        }
    };

    let meta = Meta::new(page, limit, total);
    Ok(Json(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/reviews/{id}",
    params(
        ("id" = Uuid, Path, description = "Review ID")
    ),
    responses(
        (status = 200, description = "Get review", body = ApiResponse<Review>),
        (status = 404, description = "Review not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn get_review(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let review = match review {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };
    Ok(Json(ApiResponse::success("Review", review, None)))
}

#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Create review", body = ApiResponse<Review>),
        (status = 400, description = "Product not found or rating out of range"),
        (status = 403, description = "Only buyers can post reviews"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    ensure_buyer(&user, "Only buyers can post reviews")?;
    payload.validate()?;

    let product_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
    if product_exists.is_none() {
        return Err(AppError::BadRequest("Product not found".into()));
    }

    let review = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (id, user_id, product_id, rating, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.rating)
    .bind(payload.description)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(
        "Review created",
        review,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/reviews/{id}",
    params(
        ("id" = Uuid, Path, description = "Review ID")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated review", body = ApiResponse<Review>),
        (status = 403, description = "Not the review's author"),
        (status = 404, description = "Review not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    payload.validate()?;
    let existing = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    ensure_self_or_admin(&user, existing.user_id)?;

    let rating = payload.rating.unwrap_or(existing.rating);
    let description = payload.description.or(existing.description);

    let review = sqlx::query_as::<_, Review>(
        "UPDATE reviews SET rating = $2, description = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(rating)
    .bind(description)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(
        "Updated",
        review,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(
        ("id" = Uuid, Path, description = "Review ID")
    ),
    responses(
        (status = 200, description = "Review deleted"),
        (status = 403, description = "Not the review's author"),
        (status = 404, description = "Review not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let existing = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    ensure_self_or_admin(&user, existing.user_id)?;

    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(
        "Review deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}
