use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::orders::{
        AssignCompanyRequest, CheckoutResponse, OrderList, SetLocationRequest, UpdateOrderRequest,
    },
    entity::{
        cart_items::{self, Column as CartCol, Entity as CartItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_buyer},
    models::{DeliveryStatus, Order, OrderStatus, Role},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Convert every cart row of the buyer into an order inside one transaction:
/// order insertion, stock decrement and cart deletion commit or roll back together.
pub async fn checkout(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CheckoutResponse>> {
    ensure_buyer(user, "Only buyers can checkout")?;

    let txn = state.orm.begin().await?;

    #[derive(Debug, FromQueryResult)]
    struct CartProductRow {
        product_id: Uuid,
        store_id: Uuid,
        cart_quantity: i32,
        price: i64,
        stock: i32,
    }

    let rows = CartItems::find()
        .select_only()
        .column_as(CartCol::ProductId, "product_id")
        .column_as(ProdCol::StoreId, "store_id")
        .column_as(CartCol::Quantity, "cart_quantity")
        .column_as(ProdCol::Price, "price")
        .column_as(ProdCol::Quantity, "stock")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .into_model::<CartProductRow>()
        .all(&txn)
        .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest("No items in cart".into()));
    }

    // The cart itself never checks stock; availability is enforced here so the
    // quantity >= 0 invariant survives checkout.
    for row in &rows {
        if row.stock < row.cart_quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for product {}",
                row.product_id
            )));
        }
    }

    let mut orders: Vec<Order> = Vec::with_capacity(rows.len());
    for row in &rows {
        let order = OrderActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(row.product_id),
            store_id: Set(row.store_id),
            delivery_company_id: Set(None),
            quantity: Set(row.cart_quantity),
            price: Set(row.price),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            delivery_status: Set(DeliveryStatus::Pending.as_str().to_string()),
            location: Set(None),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&txn)
        .await?;

        orders.push(order_from_entity(order)?);

        Products::update_many()
            .col_expr(
                ProdCol::Quantity,
                Expr::col(ProdCol::Quantity).sub(row.cart_quantity),
            )
            .filter(ProdCol::Id.eq(row.product_id))
            .exec(&txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_count": orders.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse { orders },
        Some(Meta::empty()),
    ))
}

/// Orders are listed through the caller's role: buyers see their own, sellers
/// see orders against their store, deliverers see orders assigned to their
/// company, admins see everything.
pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let scope = match user.role {
        Role::Buyer => Some(OrderCol::UserId.eq(user.user_id)),
        Role::Seller => match seller_store_id(state, user.user_id).await? {
            Some(store_id) => Some(OrderCol::StoreId.eq(store_id)),
            None => return Ok(empty_list(page, limit)),
        },
        Role::Deliverer => match deliverer_company_id(state, user.user_id).await? {
            Some(company_id) => Some(OrderCol::DeliveryCompanyId.eq(company_id)),
            None => return Ok(empty_list(page, limit)),
        },
        Role::Admin => None,
    };

    let mut condition = Condition::all();
    if let Some(scope) = scope {
        condition = condition.add(scope);
    }
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    ensure_order_party(state, user, &order).await?;

    Ok(ApiResponse::success(
        "OK",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

/// Order status and delivery status are patched independently: status by the
/// store's seller (or admin), delivery status by the assigned deliverer (or admin).
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    if payload.status.is_none() && payload.delivery_status.is_none() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if payload.status.is_some() {
        ensure_store_party(state, user, existing.store_id).await?;
    }
    if payload.delivery_status.is_some() {
        ensure_delivery_party(state, user, existing.delivery_company_id).await?;
    }

    let mut active: OrderActive = existing.into();
    if let Some(status) = payload.status {
        active.status = Set(status.as_str().to_string());
    }
    if let Some(delivery_status) = payload.delivery_status {
        active.delivery_status = Set(delivery_status.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "status": order.status,
            "delivery_status": order.delivery_status,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    match user.role {
        Role::Admin => {}
        Role::Buyer if existing.user_id == user.user_id => {}
        _ => {
            return Err(AppError::Forbidden(
                "Only the buyer or an admin can delete an order".into(),
            ));
        }
    }

    let status: OrderStatus = existing
        .status
        .parse()
        .map_err(|e: crate::models::UnknownValue| AppError::Internal(anyhow::anyhow!(e)))?;
    if !status.is_terminal() {
        return Err(AppError::BadRequest(
            "Only completed, cancelled or denied orders can be deleted".into(),
        ));
    }

    Orders::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Buyer bulk action: attach a delivery company to every pending order.
pub async fn assign_delivery_company(
    state: &AppState,
    user: &AuthUser,
    payload: AssignCompanyRequest,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_buyer(user, "Only buyers can assign a delivery company")?;

    let company: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM delivery_companies WHERE id = $1")
            .bind(payload.delivery_company_id)
            .fetch_optional(&state.pool)
            .await?;
    if company.is_none() {
        return Err(AppError::BadRequest("Delivery company not found".into()));
    }

    Orders::update_many()
        .col_expr(
            OrderCol::DeliveryCompanyId,
            Expr::value(payload.delivery_company_id),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&state.orm)
        .await?;

    pending_orders(state, user, "Delivery company assigned").await
}

/// Buyer bulk action: set the delivery location on every pending order.
pub async fn set_delivery_location(
    state: &AppState,
    user: &AuthUser,
    payload: SetLocationRequest,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_buyer(user, "Only buyers can set a delivery location")?;
    payload.validate()?;

    Orders::update_many()
        .col_expr(OrderCol::Location, Expr::value(payload.location))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&state.orm)
        .await?;

    pending_orders(state, user, "Delivery location set").await
}

async fn pending_orders(
    state: &AppState,
    user: &AuthUser,
    message: &str,
) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        message,
        OrderList { items: orders },
        Some(Meta::empty()),
    ))
}

fn empty_list(page: i64, limit: i64) -> ApiResponse<OrderList> {
    ApiResponse::success(
        "Orders",
        OrderList { items: Vec::new() },
        Some(Meta::new(page, limit, 0)),
    )
}

async fn seller_store_id(state: &AppState, seller_id: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM stores WHERE seller_id = $1")
        .bind(seller_id)
        .fetch_optional(&state.pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

async fn deliverer_company_id(state: &AppState, deliverer_id: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM delivery_companies WHERE deliverer_id = $1")
            .bind(deliverer_id)
            .fetch_optional(&state.pool)
            .await?;
    Ok(row.map(|(id,)| id))
}

/// Read gate: the buyer, the store's seller, the assigned deliverer, or admin.
async fn ensure_order_party(state: &AppState, user: &AuthUser, order: &OrderModel) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Buyer => {
            if order.user_id == user.user_id {
                Ok(())
            } else {
                Err(AppError::Forbidden("Not your order".into()))
            }
        }
        Role::Seller => ensure_store_party(state, user, order.store_id).await,
        Role::Deliverer => ensure_delivery_party(state, user, order.delivery_company_id).await,
    }
}

async fn ensure_store_party(state: &AppState, user: &AuthUser, store_id: Uuid) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Seller => match seller_store_id(state, user.user_id).await? {
            Some(id) if id == store_id => Ok(()),
            _ => Err(AppError::Forbidden(
                "Only the store's seller can update the order status".into(),
            )),
        },
        Role::Buyer | Role::Deliverer => Err(AppError::Forbidden(
            "Only the store's seller can update the order status".into(),
        )),
    }
}

async fn ensure_delivery_party(
    state: &AppState,
    user: &AuthUser,
    delivery_company_id: Option<Uuid>,
) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Deliverer => {
            let assigned = match delivery_company_id {
                Some(id) => id,
                None => {
                    return Err(AppError::BadRequest(
                        "Order has no delivery company assigned".into(),
                    ));
                }
            };
            match deliverer_company_id(state, user.user_id).await? {
                Some(id) if id == assigned => Ok(()),
                _ => Err(AppError::Forbidden(
                    "Only the assigned deliverer can update the delivery status".into(),
                )),
            }
        }
        Role::Buyer | Role::Seller => Err(AppError::Forbidden(
            "Only the assigned deliverer can update the delivery status".into(),
        )),
    }
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = model
        .status
        .parse()
        .map_err(|e: crate::models::UnknownValue| AppError::Internal(anyhow::anyhow!(e)))?;
    let delivery_status = model
        .delivery_status
        .parse()
        .map_err(|e: crate::models::UnknownValue| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        product_id: model.product_id,
        store_id: model.store_id,
        delivery_company_id: model.delivery_company_id,
        quantity: model.quantity,
        price: model.price,
        status,
        delivery_status,
        location: model.location,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
