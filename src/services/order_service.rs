use crate::entities::{
    OrderStatus, PaymentStatus, order_entity as orders, order_item_entity as order_items,
    product_entity as products,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    OrderQuery, OrderResponse, PaginatedResponse, PaginationParams, PlaceOrderRequest,
};
use crate::utils::generate_order_number;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use std::collections::HashMap;

/// 订单号冲突时整个事务重试的上限
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct OrderService {
    pool: DatabaseConnection,
}

impl OrderService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 下单
    ///
    /// 逻辑:
    /// 1. 写库前校验请求本身 (购物车非空、数量为正、必填联系信息)
    /// 2. 单个事务内: 逐项读取商品校验库存并按当前价格累计总额,
    ///    插入订单头与明细(价格快照), 再做带条件的原子扣库存
    /// 3. 扣库存影响行数为0说明并发订单抢走了库存, 整个事务回滚
    /// 4. 订单号撞唯一索引时换新号重试整个事务, 最多3次
    pub async fn place_order(
        &self,
        user_id: i64,
        request: PlaceOrderRequest,
    ) -> AppResult<OrderResponse> {
        Self::validate_request(&request)?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let order_number = generate_order_number();

            match self.try_place_order(user_id, &request, &order_number).await {
                Err(AppError::DuplicateOrderNumber) if attempts < MAX_ORDER_NUMBER_ATTEMPTS => {
                    log::warn!("Order number collision on {order_number}, retrying");
                    continue;
                }
                result => return result,
            }
        }
    }

    fn validate_request(request: &PlaceOrderRequest) -> AppResult<()> {
        if request.items.is_empty() {
            return Err(AppError::InvalidOrder(
                "Order must contain at least one item".to_string(),
            ));
        }
        if request.items.iter().any(|item| item.quantity < 1) {
            return Err(AppError::InvalidOrder(
                "Item quantity must be at least 1".to_string(),
            ));
        }
        if request.customer_name.trim().is_empty() {
            return Err(AppError::InvalidOrder(
                "Customer name is required".to_string(),
            ));
        }
        if request.shipping_address.trim().is_empty() {
            return Err(AppError::InvalidOrder(
                "Shipping address is required".to_string(),
            ));
        }
        if request.payment_method.trim().is_empty() {
            return Err(AppError::InvalidOrder(
                "Payment method is required".to_string(),
            ));
        }
        Ok(())
    }

    /// 一次完整的下单事务, 失败时不留下任何部分状态
    async fn try_place_order(
        &self,
        user_id: i64,
        request: &PlaceOrderRequest,
        order_number: &str,
    ) -> AppResult<OrderResponse> {
        let txn = self.pool.begin().await?;

        // 读取商品、校验库存、按当前价格计算总额
        let mut total_cents: i64 = 0;
        let mut priced_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = products::Entity::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or(AppError::ProductNotFound(item.product_id))?;

            if item.quantity > product.quantity {
                return Err(AppError::OutOfStock {
                    product_name: product.name,
                    requested: item.quantity,
                    available: product.quantity,
                });
            }

            let subtotal = product.price_cents * item.quantity as i64;
            total_cents += subtotal;
            priced_items.push((product, item.quantity, subtotal));
        }

        let now = Utc::now();
        let order = match (orders::ActiveModel {
            order_number: Set(order_number.to_string()),
            user_id: Set(user_id),
            customer_name: Set(request.customer_name.trim().to_string()),
            customer_phone: Set(request.customer_phone.clone()),
            shipping_address: Set(request.shipping_address.trim().to_string()),
            total_cents: Set(total_cents),
            status: Set(OrderStatus::Pending),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(PaymentStatus::Pending),
            notes: Set(request.notes.clone()),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        })
        .insert(&txn)
        .await
        {
            Ok(order) => order,
            Err(e) => return Err(Self::classify_insert_err(e)),
        };

        let mut inserted_items = Vec::with_capacity(priced_items.len());
        for (product, quantity, subtotal) in &priced_items {
            let item = order_items::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                unit_price_cents: Set(product.price_cents),
                quantity: Set(*quantity),
                subtotal_cents: Set(*subtotal),
                created_at: Set(Some(now)),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            inserted_items.push(item);
        }

        // 原子扣库存: UPDATE products SET quantity = quantity - ?
        //            WHERE id = ? AND quantity >= ?
        // 影响行数为0说明并发订单先一步提交, 重新读一次库存报精确的缺货错误
        for (product, quantity, _) in &priced_items {
            let update_result = products::Entity::update_many()
                .col_expr(
                    products::Column::Quantity,
                    Expr::col(products::Column::Quantity).sub(*quantity),
                )
                .filter(products::Column::Id.eq(product.id))
                .filter(products::Column::Quantity.gte(*quantity))
                .exec(&txn)
                .await?;

            if update_result.rows_affected != 1 {
                let available = products::Entity::find_by_id(product.id)
                    .one(&txn)
                    .await?
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                return Err(AppError::OutOfStock {
                    product_name: product.name.clone(),
                    requested: *quantity,
                    available,
                });
            }
        }

        txn.commit().await?;

        log::info!(
            "Order {} placed by user {user_id}: {} items, total {total_cents} cents",
            order.order_number,
            inserted_items.len()
        );

        Ok(OrderResponse::from_parts(order, inserted_items))
    }

    fn classify_insert_err(e: DbErr) -> AppError {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::DuplicateOrderNumber,
            _ => e.into(),
        }
    }

    /// 更新订单状态, 仅限合法的状态机迁移
    ///
    /// 取消订单时在同一事务内把每条明细的数量加回对应商品;
    /// 已取消的订单再次取消返回 AlreadyCancelled, 库存不会二次恢复。
    pub async fn update_order_status(
        &self,
        order_id: i64,
        new_status_str: &str,
    ) -> AppResult<OrderResponse> {
        let new_status: OrderStatus = new_status_str.parse()?;

        let txn = self.pool.begin().await?;

        let order = orders::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))?;

        if order.status == OrderStatus::Cancelled && new_status == OrderStatus::Cancelled {
            return Err(AppError::AlreadyCancelled);
        }
        if !order.status.can_transition_to(new_status) {
            return Err(AppError::InvalidStatus(format!(
                "Cannot transition order from {} to {}",
                order.status, new_status
            )));
        }

        let items = order_items::Entity::find()
            .filter(order_items::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        if new_status == OrderStatus::Cancelled {
            self.restore_stock(&txn, &items).await?;
        }

        let mut am = order.into_active_model();
        am.status = Set(new_status);
        am.updated_at = Set(Some(Utc::now()));
        let updated = am.update(&txn).await?;

        txn.commit().await?;

        log::info!("Order {order_id} status changed to {new_status}");

        Ok(OrderResponse::from_parts(updated, items))
    }

    /// 取消订单时恢复库存。商品在下单后被删除的, 跳过并记日志,
    /// 订单历史不能因为目录变化而无法取消。
    async fn restore_stock(
        &self,
        txn: &DatabaseTransaction,
        items: &[order_items::Model],
    ) -> AppResult<()> {
        for item in items {
            let update_result = products::Entity::update_many()
                .col_expr(
                    products::Column::Quantity,
                    Expr::col(products::Column::Quantity).add(item.quantity),
                )
                .filter(products::Column::Id.eq(item.product_id))
                .exec(txn)
                .await?;

            if update_result.rows_affected == 0 {
                log::warn!(
                    "Product {} no longer exists, skipping stock restore of {} units",
                    item.product_id,
                    item.quantity
                );
            }
        }
        Ok(())
    }

    /// 查询单个订单, 仅订单所有者或管理员可见
    pub async fn get_order(
        &self,
        order_id: i64,
        acting_user_id: i64,
        is_admin: bool,
    ) -> AppResult<OrderResponse> {
        let order = orders::Entity::find_by_id(order_id)
            .one(&self.pool)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))?;

        if !is_admin && order.user_id != acting_user_id {
            return Err(AppError::PermissionDenied);
        }

        let items = order_items::Entity::find()
            .filter(order_items::Column::OrderId.eq(order_id))
            .all(&self.pool)
            .await?;

        Ok(OrderResponse::from_parts(order, items))
    }

    /// 当前用户的订单列表(分页, 可按状态过滤)
    pub async fn list_my_orders(
        &self,
        user_id: i64,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        self.list_orders_filtered(Some(user_id), query).await
    }

    /// 全量订单列表, 管理端用
    pub async fn list_orders(&self, query: &OrderQuery) -> AppResult<PaginatedResponse<OrderResponse>> {
        self.list_orders_filtered(None, query).await
    }

    async fn list_orders_filtered(
        &self,
        user_id: Option<i64>,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let offset = params.get_offset();
        let limit = params.get_limit();

        let status = match &query.status {
            Some(s) => Some(s.parse::<OrderStatus>()?),
            None => None,
        };

        let mut base_query = orders::Entity::find();
        if let Some(uid) = user_id {
            base_query = base_query.filter(orders::Column::UserId.eq(uid));
        }
        if let Some(status) = status {
            base_query = base_query.filter(orders::Column::Status.eq(status));
        }

        let total = base_query.clone().count(&self.pool).await? as i64;

        let order_models = base_query
            .order_by(orders::Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(&self.pool)
            .await?;

        let items = self.attach_items(&order_models).await?;

        // 响应里回报的分页参数必须和查询实际用的 offset/limit 一致
        Ok(PaginatedResponse::new(
            items,
            params.page.unwrap_or(1).max(1),
            limit,
            total,
        ))
    }

    /// 按订单 id 批量取回明细并挂到各自的订单上
    async fn attach_items(&self, order_models: &[orders::Model]) -> AppResult<Vec<OrderResponse>> {
        let order_ids: Vec<i64> = order_models.iter().map(|o| o.id).collect();

        let mut grouped: HashMap<i64, Vec<order_items::Model>> = HashMap::new();
        if !order_ids.is_empty() {
            let all_items = order_items::Entity::find()
                .filter(order_items::Column::OrderId.is_in(order_ids))
                .all(&self.pool)
                .await?;
            for item in all_items {
                grouped.entry(item.order_id).or_default().push(item);
            }
        }

        Ok(order_models
            .iter()
            .map(|order| {
                let items = grouped.remove(&order.id).unwrap_or_default();
                OrderResponse::from_parts(order.clone(), items)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CartItemRequest;
    use migration::MigratorTrait;
    use sea_orm::{ConnectOptions, Database};

    async fn setup_db() -> DatabaseConnection {
        // 单连接的内存库, 同一个连接上事务天然串行
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seed_product(db: &DatabaseConnection, name: &str, price_cents: i64, quantity: i32) -> i64 {
        products::ActiveModel {
            name: Set(name.to_string()),
            category: Set("Pain Relief".to_string()),
            price_cents: Set(price_cents),
            quantity: Set(quantity),
            requires_prescription: Set(false),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn product_quantity(db: &DatabaseConnection, id: i64) -> i32 {
        products::Entity::find_by_id(id)
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    fn request(items: Vec<CartItemRequest>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_name: "Jane Doe".to_string(),
            customer_phone: None,
            shipping_address: "123 Main Rd".to_string(),
            payment_method: "cash_on_delivery".to_string(),
            notes: None,
            items,
        }
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock_and_totals() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Ibuprofen", 100_00, 10).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 3,
                }]),
            )
            .await
            .unwrap();

        assert_eq!(order.total_cents, 300_00);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].subtotal_cents, 300_00);
        assert!(order.order_number.starts_with("PH"));
        assert_eq!(product_quantity(&db, p1).await, 7);
    }

    #[tokio::test]
    async fn test_total_reconciliation_across_items() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 2_50, 50).await;
        let p2 = seed_product(&db, "Vitamin C", 12_99, 50).await;

        let order = service
            .place_order(
                1,
                request(vec![
                    CartItemRequest {
                        product_id: p1,
                        quantity: 4,
                    },
                    CartItemRequest {
                        product_id: p2,
                        quantity: 2,
                    },
                ]),
            )
            .await
            .unwrap();

        let item_sum: i64 = order.items.iter().map(|i| i.subtotal_cents).sum();
        assert_eq!(order.total_cents, item_sum);
        for item in &order.items {
            assert_eq!(
                item.subtotal_cents,
                item.unit_price_cents * item.quantity as i64
            );
        }
    }

    #[tokio::test]
    async fn test_snapshot_price_survives_product_price_change() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 5_00, 20).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap();

        // 改价
        let mut am = products::Entity::find_by_id(p1)
            .one(&db)
            .await
            .unwrap()
            .unwrap()
            .into_active_model();
        am.price_cents = Set(9_00);
        am.update(&db).await.unwrap();

        let reread = service.get_order(order.id, 1, false).await.unwrap();
        assert_eq!(reread.items[0].unit_price_cents, 5_00);
        assert_eq!(reread.total_cents, 5_00);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());

        let err = service.place_order(1, request(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrder(_)));
    }

    #[tokio::test]
    async fn test_non_positive_quantity_rejected() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let err = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 0,
                }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrder(_)));
        assert_eq!(product_quantity(&db, p1).await, 10);
    }

    #[tokio::test]
    async fn test_missing_customer_fields_rejected() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let mut req = request(vec![CartItemRequest {
            product_id: p1,
            quantity: 1,
        }]);
        req.customer_name = "  ".to_string();

        let err = service.place_order(1, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrder(_)));
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());

        let err = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: 999,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProductNotFound(999)));
    }

    #[tokio::test]
    async fn test_out_of_stock_reports_quantities() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Ibuprofen", 100, 5).await;

        let err = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 8,
                }]),
            )
            .await
            .unwrap_err();

        match err {
            AppError::OutOfStock {
                product_name,
                requested,
                available,
            } => {
                assert_eq!(product_name, "Ibuprofen");
                assert_eq!(requested, 8);
                assert_eq!(available, 5);
            }
            other => panic!("expected OutOfStock, got {other:?}"),
        }
        assert_eq!(product_quantity(&db, p1).await, 5);
    }

    #[tokio::test]
    async fn test_failed_order_leaves_no_partial_state() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;
        let p2 = seed_product(&db, "Ibuprofen", 100, 2).await;

        // 第一项合法, 第二项库存不足, 整单必须无痕回滚
        let err = service
            .place_order(
                1,
                request(vec![
                    CartItemRequest {
                        product_id: p1,
                        quantity: 3,
                    },
                    CartItemRequest {
                        product_id: p2,
                        quantity: 5,
                    },
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OutOfStock { .. }));

        assert_eq!(product_quantity(&db, p1).await, 10);
        assert_eq!(product_quantity(&db, p2).await, 2);
        assert_eq!(orders::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(order_items::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_restores_stock_exactly_once() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Ibuprofen", 100_00, 20).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 5,
                }]),
            )
            .await
            .unwrap();
        assert_eq!(product_quantity(&db, p1).await, 15);

        let cancelled = service
            .update_order_status(order.id, "cancelled")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(product_quantity(&db, p1).await, 20);

        // 二次取消不得再次恢复库存
        let err = service
            .update_order_status(order.id, "cancelled")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyCancelled));
        assert_eq!(product_quantity(&db, p1).await, 20);
    }

    #[tokio::test]
    async fn test_cancel_skips_deleted_product() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 2,
                }]),
            )
            .await
            .unwrap();

        products::Entity::delete_by_id(p1).exec(&db).await.unwrap();

        // 商品没了, 取消依旧成功
        let cancelled = service
            .update_order_status(order.id, "cancelled")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_status_machine_enforced() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap();

        // pending -> shipped 跳步, 拒绝
        let err = service
            .update_order_status(order.id, "shipped")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));

        // 未知状态
        let err = service
            .update_order_status(order.id, "refunded")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));

        // 合法链路 pending -> processing -> shipped -> delivered
        service
            .update_order_status(order.id, "processing")
            .await
            .unwrap();
        service
            .update_order_status(order.id, "shipped")
            .await
            .unwrap();
        let delivered = service
            .update_order_status(order.id, "delivered")
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        // 终态后不可再动, 库存不受影响
        let err = service
            .update_order_status(order.id, "pending")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));
        let err = service
            .update_order_status(order.id, "cancelled")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));
        assert_eq!(product_quantity(&db, p1).await, 9);
    }

    #[tokio::test]
    async fn test_update_status_of_missing_order() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());

        let err = service.update_order_status(404, "processing").await.unwrap_err();
        assert!(matches!(err, AppError::OrderNotFound(404)));
    }

    #[tokio::test]
    async fn test_no_oversell_under_concurrency() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Ibuprofen", 100, 10).await;

        // 两个并发订单各要6件, 库存10, 只能成一单
        let s1 = service.clone();
        let s2 = service.clone();
        let req1 = request(vec![CartItemRequest {
            product_id: p1,
            quantity: 6,
        }]);
        let req2 = req1.clone();

        let (r1, r2) = tokio::join!(s1.place_order(1, req1), s2.place_order(2, req2));

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = if r1.is_err() { r1.unwrap_err() } else { r2.unwrap_err() };
        assert!(matches!(failure, AppError::OutOfStock { .. }));
        assert_eq!(product_quantity(&db, p1).await, 4);
    }

    #[tokio::test]
    async fn test_order_numbers_distinct() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 100).await;

        let mut numbers = std::collections::HashSet::new();
        for user_id in 1..=5 {
            let order = service
                .place_order(
                    user_id,
                    request(vec![CartItemRequest {
                        product_id: p1,
                        quantity: 1,
                    }]),
                )
                .await
                .unwrap();
            assert!(numbers.insert(order.order_number));
        }
    }

    #[tokio::test]
    async fn test_forced_duplicate_order_number() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let req = request(vec![CartItemRequest {
            product_id: p1,
            quantity: 1,
        }]);

        // 先占用一个订单号, 再强制用同一个号下单
        service.try_place_order(1, &req, "PH-FIXED-0001").await.unwrap();
        let err = service
            .try_place_order(2, &req, "PH-FIXED-0001")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateOrderNumber));

        // 冲突的事务完整回滚: 只有第一单扣了库存
        assert_eq!(product_quantity(&db, p1).await, 9);
        assert_eq!(orders::Entity::find().count(&db).await.unwrap(), 1);

        // 对外的 place_order 自己换号重试, 不受已占用号码影响
        let order = service.place_order(3, req).await.unwrap();
        assert_ne!(order.order_number, "PH-FIXED-0001");
    }

    #[tokio::test]
    async fn test_get_order_access_control() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        let order = service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap();

        // 本人与管理员可见, 其他用户拒绝
        assert!(service.get_order(order.id, 1, false).await.is_ok());
        assert!(service.get_order(order.id, 99, true).await.is_ok());
        let err = service.get_order(order.id, 2, false).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied));

        let err = service.get_order(12345, 1, false).await.unwrap_err();
        assert!(matches!(err, AppError::OrderNotFound(12345)));
    }

    #[tokio::test]
    async fn test_list_orders_with_status_filter() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 100).await;

        let item = || {
            vec![CartItemRequest {
                product_id: p1,
                quantity: 1,
            }]
        };
        let o1 = service.place_order(1, request(item())).await.unwrap();
        let _o2 = service.place_order(1, request(item())).await.unwrap();
        let _o3 = service.place_order(2, request(item())).await.unwrap();
        service.update_order_status(o1.id, "cancelled").await.unwrap();

        let mine = service
            .list_my_orders(
                1,
                &OrderQuery {
                    page: None,
                    per_page: None,
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(mine.total, 2);
        assert!(mine.data.iter().all(|o| o.user_id == 1));
        assert!(mine.data.iter().all(|o| o.items.len() == 1));

        let cancelled = service
            .list_orders(&OrderQuery {
                page: None,
                per_page: None,
                status: Some("cancelled".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.total, 1);
        assert_eq!(cancelled.data[0].id, o1.id);

        let all = service
            .list_orders(&OrderQuery {
                page: None,
                per_page: None,
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(all.total, 3);

        let err = service
            .list_orders(&OrderQuery {
                page: None,
                per_page: None,
                status: Some("bogus".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn test_list_orders_with_extreme_per_page() {
        let db = setup_db().await;
        let service = OrderService::new(db.clone());
        let p1 = seed_product(&db, "Aspirin", 100, 10).await;

        service
            .place_order(
                1,
                request(vec![CartItemRequest {
                    product_id: p1,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap();

        // per_page=0 不能 panic, 回报的 page_size 是实际生效的下限
        let zero = service
            .list_orders(&OrderQuery {
                page: None,
                per_page: Some(0),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(zero.total, 1);
        assert_eq!(zero.page_size, 1);
        assert_eq!(zero.total_pages, 1);

        // per_page=1000 被钳到100, 回报值与查询 limit 一致
        let huge = service
            .list_orders(&OrderQuery {
                page: None,
                per_page: Some(1000),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(huge.page_size, 100);
        assert_eq!(huge.total_pages, 1);
    }
}
