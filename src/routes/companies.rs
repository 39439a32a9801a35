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
    middleware::auth::{AuthUser, ensure_deliverer},
    models::{DeliveryCompany, Role},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    pub location: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    pub location: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct CompanyList {
    pub items: Vec<DeliveryCompany>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_companies).post(create_company))
        .route(
            "/{id}",
            get(get_company).patch(update_company).delete(delete_company),
        )
}

#[utoipa::path(
    get,
    path = "/api/companies",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List delivery companies", body = ApiResponse<CompanyList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Companies"
)]
pub async fn list_companies(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CompanyList>>> {
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, DeliveryCompany>(
        "SELECT * FROM delivery_companies ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM delivery_companies")
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(Json(ApiResponse::success(
        "Companies",
        CompanyList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/companies/{id}",
    params(
        ("id" = Uuid, Path, description = "Company ID")
    ),
    responses(
        (status = 200, description = "Get company", body = ApiResponse<DeliveryCompany>),
        (status = 404, description = "Company not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Companies"
)]
pub async fn get_company(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeliveryCompany>>> {
    let company =
        sqlx::query_as::<_, DeliveryCompany>("SELECT * FROM delivery_companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    let company = match company {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };
    Ok(Json(ApiResponse::success("Company", company, None)))
}

#[utoipa::path(
    post,
    path = "/api/companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Create the deliverer's company", body = ApiResponse<DeliveryCompany>),
        (status = 400, description = "Deliverer already has a company or name taken"),
        (status = 403, description = "Only deliverers can create a delivery company"),
    ),
    security(("bearer_auth" = [])),
    tag = "Companies"
)]
pub async fn create_company(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<Json<ApiResponse<DeliveryCompany>>> {
    ensure_deliverer(&user, "Only deliverers can create a delivery company")?;
    payload.validate()?;

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM delivery_companies WHERE deliverer_id = $1")
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Deliverer already has a company".into()));
    }

    let company = sqlx::query_as::<_, DeliveryCompany>(
        r#"
        INSERT INTO delivery_companies (id, name, location, logo, description, deliverer_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name)
    .bind(payload.location)
    .bind(payload.logo)
    .bind(payload.description)
    .bind(user.user_id)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "company_create",
        Some("delivery_companies"),
        Some(serde_json::json!({ "company_id": company.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(Json(ApiResponse::success(
        "Company created",
        company,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/companies/{id}",
    params(
        ("id" = Uuid, Path, description = "Company ID")
    ),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Updated company", body = ApiResponse<DeliveryCompany>),
        (status = 403, description = "Not the owning deliverer"),
        (status = 404, description = "Company not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Companies"
)]
pub async fn update_company(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> AppResult<Json<ApiResponse<DeliveryCompany>>> {
    payload.validate()?;
    let existing =
        sqlx::query_as::<_, DeliveryCompany>("SELECT * FROM delivery_companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    ensure_company_owner(&user, &existing)?;

    let name = payload.name.unwrap_or(existing.name);
    let location = payload.location.or(existing.location);
    let logo = payload.logo.or(existing.logo);
    let description = payload.description.or(existing.description);

    let company = sqlx::query_as::<_, DeliveryCompany>(
        r#"
        UPDATE delivery_companies
        SET name = $2, location = $3, logo = $4, description = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(location)
    .bind(logo)
    .bind(description)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(
        "Updated",
        company,
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/companies/{id}",
    params(
        ("id" = Uuid, Path, description = "Company ID")
    ),
    responses(
        (status = 200, description = "Company deleted"),
        (status = 403, description = "Not the owning deliverer"),
        (status = 404, description = "Company not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Companies"
)]
pub async fn delete_company(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let existing =
        sqlx::query_as::<_, DeliveryCompany>("SELECT * FROM delivery_companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    ensure_company_owner(&user, &existing)?;

    sqlx::query("DELETE FROM delivery_companies WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(
        "Company deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

fn ensure_company_owner(user: &AuthUser, company: &DeliveryCompany) -> Result<(), AppError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Deliverer if company.deliverer_id == user.user_id => Ok(()),
        Role::Deliverer | Role::Buyer | Role::Seller => Err(AppError::Forbidden(
            "Only the owning deliverer can modify this company".to_string(),
        )),
    }
}
