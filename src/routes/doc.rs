use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse, TokenPair},
        cart::{CartItemDto, CartList},
        orders::{AssignCompanyRequest, CheckoutResponse, OrderList, SetLocationRequest, UpdateOrderRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    models::{
        CartItem, Complaint, ComplaintStatus, DeliveryCompany, DeliveryStatus, Order, OrderStatus,
        Product, Review, Role, Store, User, Wishlist,
    },
    response::{ApiResponse, Meta},
    routes::{
        auth, cart, companies, complaints, health, orders, params, products as product_routes,
        reviews, stores, users, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        stores::list_stores,
        stores::get_store,
        stores::create_store,
        stores::update_store,
        stores::delete_store,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::increment_item,
        cart::decrement_item,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::assign_delivery_company,
        orders::set_delivery_location,
        orders::get_order,
        orders::update_order,
        orders::delete_order,
        companies::list_companies,
        companies::get_company,
        companies::create_company,
        companies::update_company,
        companies::delete_company,
        reviews::list_reviews,
        reviews::get_review,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        complaints::list_complaints,
        complaints::get_complaint,
        complaints::create_complaint,
        complaints::resolve_complaint,
        complaints::delete_complaint
    ),
    components(
        schemas(
            User,
            Store,
            Product,
            CartItem,
            Order,
            Wishlist,
            Review,
            Complaint,
            DeliveryCompany,
            Role,
            OrderStatus,
            DeliveryStatus,
            ComplaintStatus,
            RegisterRequest,
            RegisterResponse,
            LoginRequest,
            TokenPair,
            RefreshRequest,
            RefreshResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CartList,
            CartItemDto,
            OrderList,
            CheckoutResponse,
            UpdateOrderRequest,
            AssignCompanyRequest,
            SetLocationRequest,
            users::UpdateUserRequest,
            users::UserList,
            stores::CreateStoreRequest,
            stores::UpdateStoreRequest,
            stores::StoreList,
            companies::CreateCompanyRequest,
            companies::UpdateCompanyRequest,
            companies::CompanyList,
            reviews::CreateReviewRequest,
            reviews::UpdateReviewRequest,
            reviews::ReviewList,
            wishlist::WishlistProductList,
            complaints::CreateComplaintRequest,
            complaints::ResolveComplaintRequest,
            complaints::ComplaintList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartList>,
            ApiResponse<OrderList>,
            ApiResponse<CheckoutResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and token refresh"),
        (name = "Users", description = "User management"),
        (name = "Stores", description = "Seller storefronts"),
        (name = "Products", description = "Product catalog"),
        (name = "Cart", description = "Buyer cart"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Companies", description = "Delivery companies"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Wishlist", description = "Buyer wishlist"),
        (name = "Complaints", description = "Complaints against stores"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
