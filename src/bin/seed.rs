use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&pool, "admin", "admin@example.com", "Admin123!", "admin").await?;
    let seller_id = ensure_user(&pool, "seller", "seller@example.com", "Seller123!", "seller").await?;
    let buyer_id = ensure_user(&pool, "buyer", "buyer@example.com", "Buyer123!", "buyer").await?;
    let deliverer_id = ensure_user(
        &pool,
        "deliverer",
        "deliverer@example.com",
        "Deliver123!",
        "deliverer",
    )
    .await?;

    let store_id = ensure_store(&pool, seller_id).await?;
    ensure_company(&pool, deliverer_id).await?;
    seed_products(&pool, store_id).await?;

    println!("Seed completed. Admin: {admin_id}, Seller: {seller_id}, Buyer: {buyer_id}, Deliverer: {deliverer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    username: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_store(pool: &sqlx::PgPool, seller_id: Uuid) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO stores (id, name, description, location, seller_id)
        VALUES ($1, 'Demo Store', 'Everything a demo needs', 'Nairobi', $2)
        ON CONFLICT (seller_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(seller_id)
    .fetch_optional(pool)
    .await?;

    let store_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM stores WHERE seller_id = $1")
                .bind(seller_id)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured store for seller {seller_id}");
    Ok(store_id)
}

async fn ensure_company(pool: &sqlx::PgPool, deliverer_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO delivery_companies (id, name, location, description, deliverer_id)
        VALUES ($1, 'Swift Couriers', 'Nairobi', 'Same-day delivery', $2)
        ON CONFLICT (deliverer_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(deliverer_id)
    .execute(pool)
    .await?;

    println!("Ensured delivery company for deliverer {deliverer_id}");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool, store_id: Uuid) -> anyhow::Result<()> {
    let products = vec![
        ("Wireless Earbuds", "Noise cancelling earbuds", 4500, 50, "electronics"),
        ("Canvas Sneakers", "All-day comfort", 2800, 120, "fashion"),
        ("Ceramic Mug", "Holds 350ml", 600, 200, "home"),
        ("Yoga Mat", "Non-slip surface", 1500, 75, "sports"),
    ];

    for (title, desc, price, quantity, category) in products {
        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE title = $1 AND store_id = $2")
                .bind(title)
                .bind(store_id)
                .fetch_optional(pool)
                .await?;
        if exists.is_some() {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, price, quantity, category, store_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(desc)
        .bind(price as i64)
        .bind(quantity as i32)
        .bind(category)
        .bind(store_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
