use crate::entities::{OrderStatus, order_entity as orders, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{UserResponse, UserStatistics};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};

#[derive(Clone)]
pub struct UserService {
    pool: DatabaseConnection,
}

impl UserService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 获取用户个人资料和消费统计
    pub async fn get_user_profile(
        &self,
        user_id: i64,
    ) -> AppResult<(UserResponse, UserStatistics)> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let statistics = self.get_user_statistics(user_id).await?;

        Ok((UserResponse::from(user), statistics))
    }

    /// 订单统计, 已取消的订单不计入消费
    async fn get_user_statistics(&self, user_id: i64) -> AppResult<UserStatistics> {
        #[derive(Debug, sea_orm::FromQueryResult)]
        struct OrderStatsRow {
            total_orders: i64,
            total_spent_cents: Option<i64>,
        }

        let row: Option<OrderStatsRow> = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id))
            .filter(orders::Column::Status.ne(OrderStatus::Cancelled))
            .select_only()
            .column_as(Expr::val(1).count(), "total_orders")
            .column_as(Expr::col(orders::Column::TotalCents).sum(), "total_spent_cents")
            .into_model::<OrderStatsRow>()
            .one(&self.pool)
            .await?;

        Ok(UserStatistics {
            total_orders: row.as_ref().map(|r| r.total_orders).unwrap_or(0),
            total_spent_cents: row.and_then(|r| r.total_spent_cents).unwrap_or(0),
        })
    }
}
