use crate::db::error::DbError;
use crate::db::repo::BuyOrderRepo;
use crate::db::{Db, DbResult};
use crate::models::market::{BuyOrder, OrderFilter, OrderStatus};
use crate::models::types::{ItemId, OrderId, UserId};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct BuyOrderRepository {
    db: Arc<Db>,
}

impl BuyOrderRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn row_to_order(row: &Row) -> DbResult<BuyOrder> {
    let status: String = row.get("status");
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| DbError::Decode(format!("unknown buy order status '{status}'")))?;

    Ok(BuyOrder {
        id: row.get("id"),
        buyer: row.get("buyer_id"),
        item: row.get("item_id"),
        bid_price: row.get("bid_price"),
        status,
        fulfilled_at: row.get("fulfilled_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl BuyOrderRepo for BuyOrderRepository {
    async fn insert(&self, order: &BuyOrder) -> DbResult<()> {
        let client = self.db.get_client().await?;

        client
            .execute(
                r#"
                INSERT INTO buy_orders (id, buyer_id, item_id, bid_price, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &order.id,
                    &order.buyer,
                    &order.item,
                    &order.bid_price,
                    &order.status.as_str(),
                    &order.created_at,
                    &order.updated_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: OrderId) -> DbResult<Option<BuyOrder>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt("SELECT * FROM buy_orders WHERE id = $1", &[&id])
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn query(&self, filter: &OrderFilter) -> DbResult<Vec<BuyOrder>> {
        let client = self.db.get_client().await?;

        let status = filter.status.map(|s| s.as_str());
        let rows = client
            .query(
                r#"
                SELECT * FROM buy_orders
                WHERE ($1::uuid IS NULL OR buyer_id = $1)
                  AND ($2::uuid IS NULL OR item_id = $2)
                  AND ($3::text IS NULL OR status = $3)
                  AND ($4::bigint IS NULL OR bid_price >= $4)
                ORDER BY created_at DESC
                "#,
                &[&filter.buyer, &filter.item, &status, &filter.min_price],
            )
            .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn best_bid(&self, item: ItemId, ask_price: i64) -> DbResult<Option<BuyOrder>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt(
                r#"
                SELECT * FROM buy_orders
                WHERE item_id = $1 AND status = 'active' AND bid_price >= $2
                ORDER BY bid_price DESC, created_at
                LIMIT 1
                "#,
                &[&item, &ask_price],
            )
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn mark_cancelled(&self, id: OrderId, buyer: UserId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE buy_orders SET status = 'cancelled', updated_at = NOW()
                WHERE id = $1 AND buyer_id = $2 AND status = 'active'
                "#,
                &[&id, &buyer],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn mark_fulfilled(&self, id: OrderId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE buy_orders
                SET status = 'fulfilled', fulfilled_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND status = 'active'
                "#,
                &[&id],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn reactivate(&self, id: OrderId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE buy_orders
                SET status = 'active', fulfilled_at = NULL, updated_at = NOW()
                WHERE id = $1 AND status = 'fulfilled'
                "#,
                &[&id],
            )
            .await?;

        Ok(updated > 0)
    }
}
