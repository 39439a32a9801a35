use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{CartItemDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

/// Flat delivery surcharge added once per cart.
pub const DELIVERY_FEE: i64 = 200;

pub fn total_cost(items_cost: i64) -> i64 {
    items_cost + DELIVERY_FEE
}

#[derive(sqlx::FromRow)]
struct CartWithProductRow {
    cart_id: Uuid,
    cart_quantity: i32,
    subtotal: i64,
    #[sqlx(flatten)]
    product: Product,
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity AS cart_quantity, ci.subtotal,
               p.id, p.title, p.description, p.price, p.quantity, p.category,
               p.images, p.store_id, p.created_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let totals: (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(subtotal), 0) FROM cart_items WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_one(pool)
            .await?;
    let (total, items_cost) = totals;

    let items: Vec<CartItemDto> = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            product: row.product,
            quantity: row.cart_quantity,
            subtotal: row.subtotal,
        })
        .collect();

    let data = CartList {
        items,
        items_cost,
        total_cost: if total == 0 { 0 } else { total_cost(items_cost) },
    };

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", data, Some(meta)))
}

/// First add inserts a row with quantity 1; adding the same product again
/// increments the existing row instead of creating a second one.
pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let product: Option<(i64,)> = sqlx::query_as("SELECT price FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    let (price,) = match product {
        Some(p) => p,
        None => return Err(AppError::BadRequest("Product not found".to_string())),
    };

    let exist: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user.user_id)
            .bind(product_id)
            .fetch_optional(pool)
            .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = quantity + 1, subtotal = $3 * (quantity + 1)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(user.user_id)
        .bind(price)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as::<_, CartItem>(
            r#"
            INSERT INTO cart_items (id, user_id, product_id, quantity, subtotal, items_cost, total_cost)
            VALUES ($1, $2, $3, 1, $4, 0, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(product_id)
        .bind(price)
        .fetch_one(pool)
        .await?
    };

    recompute_totals(pool, user.user_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": cart_item.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    fetch_item(pool, cart_item.id).await.map(|item| {
        ApiResponse::success("Added to cart", item, None)
    })
}

pub async fn increment_item(
    pool: &DbPool,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let updated = sqlx::query_as::<_, CartItem>(
        r#"
        UPDATE cart_items AS ci
        SET quantity = ci.quantity + 1, subtotal = p.price * (ci.quantity + 1)
        FROM products p
        WHERE p.id = ci.product_id AND ci.user_id = $1 AND ci.product_id = $2
        RETURNING ci.*
        "#,
    )
    .bind(user.user_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;
    let updated = match updated {
        Some(item) => item,
        None => return Err(AppError::NotFound),
    };

    recompute_totals(pool, user.user_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_increment",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": updated.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    fetch_item(pool, updated.id)
        .await
        .map(|item| ApiResponse::success("Quantity increased", item, None))
}

/// Decrement floors at quantity 1; removal goes through DELETE instead.
pub async fn decrement_item(
    pool: &DbPool,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let updated = sqlx::query_as::<_, CartItem>(
        r#"
        UPDATE cart_items AS ci
        SET quantity = GREATEST(ci.quantity - 1, 1),
            subtotal = p.price * GREATEST(ci.quantity - 1, 1)
        FROM products p
        WHERE p.id = ci.product_id AND ci.user_id = $1 AND ci.product_id = $2
        RETURNING ci.*
        "#,
    )
    .bind(user.user_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;
    let updated = match updated {
        Some(item) => item,
        None => return Err(AppError::NotFound),
    };

    recompute_totals(pool, user.user_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_decrement",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": updated.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    fetch_item(pool, updated.id)
        .await
        .map(|item| ApiResponse::success("Quantity decreased", item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE product_id = $1 AND user_id = $2")
        .bind(product_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    recompute_totals(pool, user.user_id).await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Rewrite the denormalized aggregate columns on every row of the buyer's cart.
async fn recompute_totals(pool: &DbPool, user_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE cart_items
        SET items_cost = totals.sum, total_cost = totals.sum + $2
        FROM (SELECT COALESCE(SUM(subtotal), 0) AS sum FROM cart_items WHERE user_id = $1) totals
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(DELIVERY_FEE)
    .execute(pool)
    .await?;
    Ok(())
}

async fn fetch_item(pool: &DbPool, id: Uuid) -> AppResult<CartItem> {
    let item = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_fee_is_a_flat_surcharge() {
        // price 300, quantity 1 -> subtotal 300, total 500
        assert_eq!(total_cost(300), 500);
        // incremented once -> subtotal 600, total 800
        assert_eq!(total_cost(600), 800);
    }
}
