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
    middleware::auth::{AuthUser, ensure_seller},
    models::{Role, Store},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateStoreRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[validate(length(min = 5, max = 150))]
    pub description: String,
    pub image: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStoreRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    #[validate(length(min = 5, max = 150))]
    pub description: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct StoreList {
    pub items: Vec<Store>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stores).post(create_store))
        .route("/{id}", get(get_store).patch(update_store).delete(delete_store))
}

#[utoipa::path(
    get,
    path = "/api/stores",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List stores", body = ApiResponse<StoreList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Stores"
)]
pub async fn list_stores(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<StoreList>>> {
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, Store>(
        "SELECT * FROM stores ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stores")
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(Json(ApiResponse::success(
        "Stores",
        StoreList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/stores/{id}",
    params(
        ("id" = Uuid, Path, description = "Store ID")
    ),
    responses(
        (status = 200, description = "Get store", body = ApiResponse<Store>),
        (status = 404, description = "Store not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Stores"
)]
pub async fn get_store(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Store>>> {
    let store = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let store = match store {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };
    Ok(Json(ApiResponse::success("Store", store, None)))
}

#[utoipa::path(
    post,
    path = "/api/stores",
    request_body = CreateStoreRequest,
    responses(
        (status = 201, description = "Create the seller's store", body = ApiResponse<Store>),
        (status = 400, description = "Seller already has a store or name taken"),
        (status = 403, description = "Only sellers can create a store"),
    ),
    security(("bearer_auth" = [])),
    tag = "Stores"
)]
pub async fn create_store(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateStoreRequest>,
) -> AppResult<Json<ApiResponse<Store>>> {
    ensure_seller(&user, "Only sellers can create a store")?;
    payload.validate()?;

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM stores WHERE seller_id = $1")
        .bind(user.user_id)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Seller already has a store".into()));
    }

    let name_taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM stores WHERE name = $1")
        .bind(payload.name.as_str())
        .fetch_optional(&state.pool)
        .await?;
    if name_taken.is_some() {
        return Err(AppError::BadRequest("Store name is already taken".into()));
    }

    let store = sqlx::query_as::<_, Store>(
        r#"
        INSERT INTO stores (id, name, description, image, location, seller_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name)
    .bind(payload.description)
    .bind(payload.image)
    .bind(payload.location)
    .bind(user.user_id)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "store_create",
        Some("stores"),
        Some(serde_json::json!({ "store_id": store.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Store created",
        store,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/stores/{id}",
    params(
        ("id" = Uuid, Path, description = "Store ID")
    ),
    request_body = UpdateStoreRequest,
    responses(
        (status = 200, description = "Updated store", body = ApiResponse<Store>),
        (status = 403, description = "Not the owning seller"),
        (status = 404, description = "Store not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Stores"
)]
pub async fn update_store(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStoreRequest>,
) -> AppResult<Json<ApiResponse<Store>>> {
    payload.validate()?;
    let existing = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };

    ensure_store_owner(&user, &existing)?;

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.unwrap_or(existing.description);
    let image = payload.image.or(existing.image);
    let location = payload.location.or(existing.location);

    let store = sqlx::query_as::<_, Store>(
        r#"
        UPDATE stores
        SET name = $2, description = $3, image = $4, location = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(image)
    .bind(location)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(
        "Updated",
        store,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/stores/{id}",
    params(
        ("id" = Uuid, Path, description = "Store ID")
    ),
    responses(
        (status = 200, description = "Store deleted"),
        (status = 403, description = "Not the owning seller"),
        (status = 404, description = "Store not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Stores"
)]
pub async fn delete_store(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let existing = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(s) => s,
        None => return Err(AppError::NotFound),
    };

    ensure_store_owner(&user, &existing)?;

    sqlx::query("DELETE FROM stores WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "store_delete",
        Some("stores"),
        Some(serde_json::json!({ "store_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Store deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

fn ensure_store_owner(user: &AuthUser, store: &Store) -> Result<(), AppError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Seller if store.seller_id == user.user_id => Ok(()),
        Role::Seller | Role::Buyer | Role::Deliverer => Err(AppError::Forbidden(
            "Only the owning seller can modify this store".to_string(),
        )),
    }
}
