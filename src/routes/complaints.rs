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
    audit::log_audit,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_buyer},
    models::{Complaint, ComplaintStatus, Role},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateComplaintRequest {
    pub store_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub subject: String,
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveComplaintRequest {
    pub status: ComplaintStatus,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ComplaintList {
    pub items: Vec<Complaint>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_complaints).post(create_complaint))
        .route(
            "/{id}",
            get(get_complaint)
                .patch(resolve_complaint)
                .delete(delete_complaint),
        )
}

#[utoipa::path(
    get,
    path = "/api/complaints",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List complaints visible to the caller", body = ApiResponse<ComplaintList>),
        (status = 403, description = "Deliverers have no complaint scope"),
    ),
    security(("bearer_auth" = [])),
    tag = "Complaints"
)]
pub async fn list_complaints(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ComplaintList>>> {
    let (page, limit, offset) = pagination.normalize();

    // Buyers see what they filed, sellers what targets their store, admins everything.
    let (items, total) = match user.role {
        Role::Buyer => {
            let items = sqlx::query_as::<_, Complaint>(
                "SELECT * FROM complaints WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(user.user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;
            let total: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM complaints WHERE user_id = $1")
                    .bind(user.user_id)
                    .fetch_one(&state.pool)
                    .await?;
            (items, total.0)
        }
        Role::Seller => {
            let items = sqlx::query_as::<_, Complaint>(
                r#"
                SELECT c.*
                FROM complaints c
                JOIN stores s ON s.id = c.store_id
                WHERE s.seller_id = $1
                ORDER BY c.created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user.user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;
            let total: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM complaints c JOIN stores s ON s.id = c.store_id WHERE s.seller_id = $1",
            )
            .bind(user.user_id)
            .fetch_one(&state.pool)
            .await?;
            (items, total.0)
        }
        Role::Admin => {
            let items = sqlx::query_as::<_, Complaint>(
                "SELECT * FROM complaints ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;
            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM complaints")
                .fetch_one(&state.pool)
                .await?;
            (items, total.0)
        }
        Role::Deliverer => {
            return Err(AppError::Forbidden(
                "Deliverers have no complaint scope".to_string(),
            ));
        }
    };

    let meta = Meta::new(page, limit, total);
    Ok(Json(ApiResponse::success(
        "Complaints",
        ComplaintList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/complaints/{id}",
    params(
        ("id" = Uuid, Path, description = "Complaint ID")
    ),
    responses(
        (status = 200, description = "Get complaint", body = ApiResponse<Complaint>),
        (status = 403, description = "Not a party to this complaint"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Complaints"
)]
pub async fn get_complaint(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Complaint>>> {
    let complaint = fetch_complaint(&state, id).await?;
    ensure_complaint_party(&state, &user, &complaint).await?;
    Ok(Json(ApiResponse::success("Complaint", complaint, None)))
}

#[utoipa::path(
    post,
    path = "/api/complaints",
    request_body = CreateComplaintRequest,
    responses(
        (status = 201, description = "File a complaint against a store", body = ApiResponse<Complaint>),
        (status = 400, description = "Store not found"),
        (status = 403, description = "Only buyers can file complaints"),
    ),
    security(("bearer_auth" = [])),
    tag = "Complaints"
)]
pub async fn create_complaint(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateComplaintRequest>,
) -> AppResult<Json<ApiResponse<Complaint>>> {
    ensure_buyer(&user, "Only buyers can file complaints")?;
    payload.validate()?;

    let store_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM stores WHERE id = $1")
        .bind(payload.store_id)
        .fetch_optional(&state.pool)
        .await?;
    if store_exists.is_none() {
        return Err(AppError::BadRequest("Store not found".into()));
    }

    let complaint = sqlx::query_as::<_, Complaint>(
        r#"
        INSERT INTO complaints (id, user_id, store_id, subject, body, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.store_id)
    .bind(payload.subject)
    .bind(payload.body)
    .bind(ComplaintStatus::Pending.as_str())
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "complaint_create",
        Some("complaints"),
        Some(serde_json::json!({ "complaint_id": complaint.id, "store_id": complaint.store_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Complaint filed",
        complaint,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/complaints/{id}",
    params(
        ("id" = Uuid, Path, description = "Complaint ID")
    ),
    request_body = ResolveComplaintRequest,
    responses(
        (status = 200, description = "Complaint status updated", body = ApiResponse<Complaint>),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Complaints"
)]
pub async fn resolve_complaint(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveComplaintRequest>,
) -> AppResult<Json<ApiResponse<Complaint>>> {
    ensure_admin(&user)?;
    let _existing = fetch_complaint(&state, id).await?;

    let complaint = sqlx::query_as::<_, Complaint>(
        "UPDATE complaints SET status = $2 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(payload.status.as_str())
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "complaint_resolve",
        Some("complaints"),
        Some(serde_json::json!({ "complaint_id": id, "status": payload.status.as_str() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Updated",
        complaint,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/complaints/{id}",
    params(
        ("id" = Uuid, Path, description = "Complaint ID")
    ),
    responses(
        (status = 200, description = "Complaint deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Complaint not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Complaints"
)]
pub async fn delete_complaint(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let existing = fetch_complaint(&state, id).await?;

    match user.role {
        Role::Admin => {}
        Role::Buyer if existing.user_id == user.user_id => {}
        _ => {
            return Err(AppError::Forbidden(
                "Only the author or an admin can delete a complaint".to_string(),
            ));
        }
    }

    sqlx::query("DELETE FROM complaints WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(
        "Complaint deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

async fn fetch_complaint(state: &AppState, id: Uuid) -> AppResult<Complaint> {
    let complaint = sqlx::query_as::<_, Complaint>("SELECT * FROM complaints WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    match complaint {
        Some(c) => Ok(c),
        None => Err(AppError::NotFound),
    }
}

async fn ensure_complaint_party(
    state: &AppState,
    user: &AuthUser,
    complaint: &Complaint,
) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Buyer if complaint.user_id == user.user_id => Ok(()),
        Role::Seller => {
            let owns: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM stores WHERE id = $1 AND seller_id = $2")
                    .bind(complaint.store_id)
                    .bind(user.user_id)
                    .fetch_optional(&state.pool)
                    .await?;
            if owns.is_some() {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "Not a party to this complaint".to_string(),
                ))
            }
        }
        Role::Buyer | Role::Deliverer => Err(AppError::Forbidden(
            "Not a party to this complaint".to_string(),
        )),
    }
}
