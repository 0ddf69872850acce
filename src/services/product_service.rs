use crate::config::InventoryConfig;
use crate::entities::product_entity as products;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateProductRequest, InventoryAlertsResponse, PaginatedResponse, PaginationParams,
    ProductQuery, ProductResponse, UpdateProductRequest,
};
use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

#[derive(Clone)]
pub struct ProductService {
    pool: DatabaseConnection,
    inventory: InventoryConfig,
}

impl ProductService {
    pub fn new(pool: DatabaseConnection, inventory: InventoryConfig) -> Self {
        Self { pool, inventory }
    }

    /// 商品列表(分页, 可按分类过滤、名称搜索)
    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> AppResult<PaginatedResponse<ProductResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let offset = params.get_offset();
        let limit = params.get_limit();

        let mut base_query = products::Entity::find();
        if let Some(category) = &query.category {
            base_query = base_query.filter(products::Column::Category.eq(category.clone()));
        }
        if let Some(search) = &query.search
            && !search.trim().is_empty()
        {
            // 两侧都转小写, SQLite/Postgres 上行为一致
            let pattern = format!("%{}%", search.trim().to_lowercase());
            base_query = base_query.filter(
                Expr::expr(Func::lower(Expr::col(products::Column::Name))).like(pattern),
            );
        }

        let total = base_query.clone().count(&self.pool).await? as i64;

        let models = base_query
            .order_by_asc(products::Column::Name)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(&self.pool)
            .await?;
        let items: Vec<ProductResponse> = models.into_iter().map(Into::into).collect();

        Ok(PaginatedResponse::new(
            items,
            params.page.unwrap_or(1).max(1),
            limit,
            total,
        ))
    }

    pub async fn get_product(&self, product_id: i64) -> AppResult<ProductResponse> {
        let product = products::Entity::find_by_id(product_id)
            .one(&self.pool)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;
        Ok(product.into())
    }

    pub async fn create_product(&self, request: CreateProductRequest) -> AppResult<ProductResponse> {
        Self::validate_fields(&request.name, &request.category, request.price_cents, request.quantity)?;

        let model = products::ActiveModel {
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            category: Set(request.category.trim().to_string()),
            manufacturer: Set(request.manufacturer),
            price_cents: Set(request.price_cents),
            quantity: Set(request.quantity),
            requires_prescription: Set(request.requires_prescription),
            expiry_date: Set(request.expiry_date),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("Product {} ({}) created", model.id, model.name);
        Ok(model.into())
    }

    /// 部分更新; quantity 在这里就是规格里说的"管理员直接改库存"
    pub async fn update_product(
        &self,
        product_id: i64,
        request: UpdateProductRequest,
    ) -> AppResult<ProductResponse> {
        let product = products::Entity::find_by_id(product_id)
            .one(&self.pool)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;

        let name = request.name.as_deref().unwrap_or(&product.name);
        let category = request.category.as_deref().unwrap_or(&product.category);
        let price_cents = request.price_cents.unwrap_or(product.price_cents);
        let quantity = request.quantity.unwrap_or(product.quantity);
        Self::validate_fields(name, category, price_cents, quantity)?;

        let mut am = product.into_active_model();
        if let Some(name) = request.name {
            am.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            am.description = Set(Some(description));
        }
        if let Some(category) = request.category {
            am.category = Set(category.trim().to_string());
        }
        if let Some(manufacturer) = request.manufacturer {
            am.manufacturer = Set(Some(manufacturer));
        }
        if let Some(price_cents) = request.price_cents {
            am.price_cents = Set(price_cents);
        }
        if let Some(quantity) = request.quantity {
            am.quantity = Set(quantity);
        }
        if let Some(requires_prescription) = request.requires_prescription {
            am.requires_prescription = Set(requires_prescription);
        }
        if let Some(expiry_date) = request.expiry_date {
            am.expiry_date = Set(Some(expiry_date));
        }
        am.updated_at = Set(Some(Utc::now()));

        let updated = am.update(&self.pool).await?;
        Ok(updated.into())
    }

    pub async fn delete_product(&self, product_id: i64) -> AppResult<()> {
        let result = products::Entity::delete_by_id(product_id)
            .exec(&self.pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::ProductNotFound(product_id));
        }
        log::info!("Product {product_id} deleted");
        Ok(())
    }

    /// 库存告警: 低库存 + 临期商品
    pub async fn inventory_alerts(&self) -> AppResult<InventoryAlertsResponse> {
        let low_stock_models = products::Entity::find()
            .filter(products::Column::Quantity.lte(self.inventory.low_stock_threshold))
            .order_by_asc(products::Column::Quantity)
            .all(&self.pool)
            .await?;

        let cutoff = Utc::now().date_naive() + Duration::days(self.inventory.expiry_warning_days);
        let expiring_models = products::Entity::find()
            .filter(products::Column::ExpiryDate.is_not_null())
            .filter(products::Column::ExpiryDate.lte(cutoff))
            .order_by_asc(products::Column::ExpiryDate)
            .all(&self.pool)
            .await?;

        Ok(InventoryAlertsResponse {
            low_stock: low_stock_models.into_iter().map(Into::into).collect(),
            expiring_soon: expiring_models.into_iter().map(Into::into).collect(),
        })
    }

    fn validate_fields(name: &str, category: &str, price_cents: i64, quantity: i32) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Product name is required".to_string(),
            ));
        }
        if category.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Product category is required".to_string(),
            ));
        }
        if price_cents < 0 {
            return Err(AppError::ValidationError(
                "Product price cannot be negative".to_string(),
            ));
        }
        if quantity < 0 {
            return Err(AppError::ValidationError(
                "Product quantity cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
