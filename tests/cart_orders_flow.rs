use marketplace_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{orders::UpdateOrderRequest, products::CreateProductRequest},
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    models::{OrderStatus, Role},
    routes::params::Pagination,
    services::{cart_service, order_service, product_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: buyer fills a cart -> checkout converts rows to orders,
// decrements stock and empties the cart; the seller completes the order and
// the buyer deletes it. A second pass checks the insufficient-stock rollback.
#[tokio::test]
async fn cart_checkout_and_order_lifecycle_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let buyer_id = create_user(&state, "buyer", "buyer", "buyer@example.com").await?;
    let seller_id = create_user(&state, "seller", "seller", "seller@example.com").await?;
    let store_id = create_store(&state, seller_id).await?;

    let product = create_product(&state, store_id, "Test Widget", 300, 10).await?;

    let buyer = AuthUser {
        user_id: buyer_id,
        role: Role::Buyer,
    };
    let seller = AuthUser {
        user_id: seller_id,
        role: Role::Seller,
    };

    // First add creates the row with quantity 1 and a flat delivery fee on top.
    let added = cart_service::add_to_cart(&state.pool, &buyer, product).await?;
    let item = added.data.unwrap();
    assert_eq!(item.quantity, 1);
    assert_eq!(item.subtotal, 300);
    assert_eq!(item.items_cost, 300);
    assert_eq!(item.total_cost, 500);

    // Adding the same product again increments the existing row.
    let added_again = cart_service::add_to_cart(&state.pool, &buyer, product).await?;
    let item = added_again.data.unwrap();
    assert_eq!(item.quantity, 2);
    assert_eq!(item.subtotal, 600);
    assert_eq!(item.total_cost, 800);

    let cart = cart_service::list_cart(&state.pool, &buyer, default_page()).await?;
    let cart = cart.data.unwrap();
    assert_eq!(cart.items.len(), 1, "same product must not create a second row");
    assert_eq!(cart.items_cost, 600);
    assert_eq!(cart.total_cost, 800);

    // Decrement floors at 1.
    cart_service::decrement_item(&state.pool, &buyer, product).await?;
    let floored = cart_service::decrement_item(&state.pool, &buyer, product).await?;
    assert_eq!(floored.data.unwrap().quantity, 1);

    // Back to 2 for checkout.
    cart_service::increment_item(&state.pool, &buyer, product).await?;

    // Buyers cannot sell.
    let forbidden = product_service::create_product(
        &state,
        &buyer,
        CreateProductRequest {
            title: "Contraband".into(),
            description: None,
            price: 100,
            quantity: 1,
            category: "other".into(),
            images: Vec::new(),
        },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    // Checkout converts the cart into orders atomically.
    let checkout = order_service::checkout(&state, &buyer).await?;
    let orders = checkout.data.unwrap().orders;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.quantity, 2);
    assert_eq!(order.price, 300);
    assert_eq!(order.status, OrderStatus::Pending);

    // Stock decremented and cart emptied.
    let refreshed = product_service::get_product(&state, product).await?;
    assert_eq!(refreshed.data.unwrap().quantity, 8);
    let cart = cart_service::list_cart(&state.pool, &buyer, default_page()).await?;
    let cart = cart.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_cost, 0, "an empty cart owes no delivery fee");

    // A second checkout with nothing in the cart is rejected.
    let empty = order_service::checkout(&state, &buyer).await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    // Pending orders cannot be deleted.
    let premature = order_service::delete_order(&state, &buyer, order.id).await;
    assert!(matches!(premature, Err(AppError::BadRequest(_))));

    // The seller completes the order, then the buyer can delete it.
    let updated = order_service::update_order(
        &state,
        &seller,
        order.id,
        UpdateOrderRequest {
            status: Some(OrderStatus::Completed),
            delivery_status: None,
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().status, OrderStatus::Completed);

    order_service::delete_order(&state, &buyer, order.id).await?;
    let gone = order_service::get_order(&state, &buyer, order.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    // Insufficient stock: two in the cart, one on the shelf.
    let scarce = create_product(&state, store_id, "Scarce Widget", 1000, 1).await?;
    cart_service::add_to_cart(&state.pool, &buyer, scarce).await?;
    cart_service::add_to_cart(&state.pool, &buyer, scarce).await?;

    let rejected = order_service::checkout(&state, &buyer).await;
    assert!(matches!(rejected, Err(AppError::BadRequest(_))));

    // The rollback left stock and cart untouched.
    let refreshed = product_service::get_product(&state, scarce).await?;
    assert_eq!(refreshed.data.unwrap().quantity, 1);
    let cart = cart_service::list_cart(&state.pool, &buyer, default_page()).await?;
    assert_eq!(cart.data.unwrap().items.len(), 1);

    Ok(())
}

fn default_page() -> Pagination {
    Pagination {
        page: None,
        per_page: None,
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE audit_logs, complaints, reviews, wishlists, orders, cart_items, \
         products, delivery_companies, stores, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState { pool, orm })
}

async fn create_user(
    state: &AppState,
    role: &str,
    username: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        contact: Set(None),
        image: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_store(state: &AppState, seller_id: Uuid) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO stores (id, name, description, seller_id) VALUES ($1, $2, 'Test store', $3)",
    )
    .bind(id)
    .bind(format!("store-{seller_id}"))
    .bind(seller_id)
    .execute(&state.pool)
    .await?;
    Ok(id)
}

async fn create_product(
    state: &AppState,
    store_id: Uuid,
    title: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        title: Set(title.to_string()),
        description: Set(None),
        price: Set(price),
        quantity: Set(stock),
        category: Set("other".into()),
        images: Set(Vec::new()),
        store_id: Set(store_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}
