use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod cart;
pub mod companies;
pub mod complaints;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;
pub mod reviews;
pub mod stores;
pub mod users;
pub mod wishlist;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/stores", stores::router())
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/companies", companies::router())
        .nest("/reviews", reviews::router())
        .nest("/wishlist", wishlist::router())
        .nest("/complaints", complaints::router())
}
