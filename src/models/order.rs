use crate::entities::{OrderStatus, PaymentStatus, order_entity, order_item_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemRequest {
    #[schema(example = 1)]
    pub product_id: i64,
    #[schema(example = 2)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[schema(example = "Jane Doe")]
    pub customer_name: String,
    #[schema(example = "+12025550123")]
    pub customer_phone: Option<String>,
    #[schema(example = "123 Main Rd")]
    pub shipping_address: String,
    #[schema(example = "cash_on_delivery")]
    pub payment_method: String,
    pub notes: Option<String>,
    pub items: Vec<CartItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[schema(example = "processing")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub subtotal_cents: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order_item_entity::Model> for OrderItemResponse {
    fn from(m: order_item_entity::Model) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            product_name: m.product_name,
            unit_price_cents: m.unit_price_cents,
            quantity: m.quantity,
            subtotal_cents: m.subtotal_cents,
        }
    }
}

impl OrderResponse {
    pub fn from_parts(order: order_entity::Model, items: Vec<order_item_entity::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            shipping_address: order.shipping_address,
            total_cents: order.total_cents,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            notes: order.notes,
            items: items.into_iter().map(Into::into).collect(),
            created_at: order.created_at.unwrap_or_else(Utc::now),
            updated_at: order.updated_at.unwrap_or_else(Utc::now),
        }
    }
}
