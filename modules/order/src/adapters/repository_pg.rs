use crate::domain::{Order, OrderRepository, OrderState};
use crate::error::OrderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Postgres-backed order repository. Save is an upsert on the order id; the
/// state column carries the lifecycle string and transitions are enforced in
/// the aggregate, not here.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    is_vip: bool,
    items: Vec<String>,
    quantity: i32,
    promo_id: Option<String>,
    seckill_product_id: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let state: OrderState = row
            .state
            .parse()
            .map_err(|e: String| OrderError::Validation(e))?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            is_vip: row.is_vip,
            items: row.items,
            quantity: row.quantity as u32,
            promo_id: row.promo_id,
            seckill_product_id: row.seckill_product_id,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, is_vip, items, quantity, promo_id, seckill_product_id,
                 state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(order.is_vip)
        .bind(&order.items)
        .bind(order.quantity as i32)
        .bind(&order.promo_id)
        .bind(&order.seckill_product_id)
        .bind(order.state.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::transport("order-repository", e.to_string()))?;
        Ok(())
    }

    async fn find(&self, order_id: &str) -> Result<Option<Order>, OrderError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, is_vip, items, quantity, promo_id, seckill_product_id,
                   state, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrderError::transport("order-repository", e.to_string()))?;

        row.map(Order::try_from).transpose()
    }
}
