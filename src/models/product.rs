use crate::entities::product_entity;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    #[schema(example = "Ibuprofen 200mg")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "Pain Relief")]
    pub category: String,
    pub manufacturer: Option<String>,
    #[schema(example = 599)]
    pub price_cents: i64,
    #[schema(example = 100)]
    pub quantity: i32,
    #[serde(default)]
    pub requires_prescription: bool,
    #[schema(example = "2027-06-30")]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub price_cents: Option<i64>,
    /// 管理员直接改库存的通道, 绕过订单流程
    pub quantity: Option<i32>,
    pub requires_prescription: Option<bool>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<String>,
    /// 名称子串搜索, 不区分大小写
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub manufacturer: Option<String>,
    pub price_cents: i64,
    pub quantity: i32,
    pub requires_prescription: bool,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryAlertsResponse {
    pub low_stock: Vec<ProductResponse>,
    pub expiring_soon: Vec<ProductResponse>,
}

impl From<product_entity::Model> for ProductResponse {
    fn from(m: product_entity::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            category: m.category,
            manufacturer: m.manufacturer,
            price_cents: m.price_cents,
            quantity: m.quantity,
            requires_prescription: m.requires_prescription,
            expiry_date: m.expiry_date,
            created_at: m.created_at.unwrap_or_else(Utc::now),
        }
    }
}
