use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{DeliveryStatus, Order, OrderStatus};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub delivery_status: Option<DeliveryStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignCompanyRequest {
    pub delivery_company_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetLocationRequest {
    #[validate(length(min = 1, max = 200))]
    pub location: String,
}
