use crate::db::error::DbError;
use crate::db::repo::TradeRepo;
use crate::db::{Db, DbResult};
use crate::models::trade::{Trade, TradeLine, TradeSide, TradeStatus};
use crate::models::types::{TradeId, UserId};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct TradeRepository {
    db: Arc<Db>,
}

impl TradeRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn row_to_trade(row: &Row) -> DbResult<Trade> {
    let status: String = row.get("status");
    let status = TradeStatus::parse(&status)
        .ok_or_else(|| DbError::Decode(format!("unknown trade status '{status}'")))?;

    let from_items: serde_json::Value = row.get("from_items");
    let to_items: serde_json::Value = row.get("to_items");

    Ok(Trade {
        id: row.get("id"),
        from_user: row.get("from_user"),
        to_user: row.get("to_user"),
        from_items: serde_json::from_value(from_items)?,
        to_items: serde_json::from_value(to_items)?,
        approved_from: row.get("approved_from"),
        approved_to: row.get("approved_to"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl TradeRepo for TradeRepository {
    async fn find_pending_between(&self, a: UserId, b: UserId) -> DbResult<Option<Trade>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt(
                r#"
                SELECT id, from_user, to_user, from_items, to_items,
                       approved_from, approved_to, status, created_at, updated_at
                FROM trades
                WHERE status = 'pending'
                  AND ((from_user = $1 AND to_user = $2) OR (from_user = $2 AND to_user = $1))
                LIMIT 1
                "#,
                &[&a, &b],
            )
            .await?;

        row.as_ref().map(row_to_trade).transpose()
    }

    async fn insert(&self, trade: &Trade) -> DbResult<()> {
        let client = self.db.get_client().await?;

        client
            .execute(
                r#"
                INSERT INTO trades (id, from_user, to_user, from_items, to_items,
                                    approved_from, approved_to, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
                &[
                    &trade.id,
                    &trade.from_user,
                    &trade.to_user,
                    &serde_json::to_value(&trade.from_items)?,
                    &serde_json::to_value(&trade.to_items)?,
                    &trade.approved_from,
                    &trade.approved_to,
                    &trade.status.as_str(),
                    &trade.created_at,
                    &trade.updated_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: TradeId) -> DbResult<Option<Trade>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt(
                r#"
                SELECT id, from_user, to_user, from_items, to_items,
                       approved_from, approved_to, status, created_at, updated_at
                FROM trades
                WHERE id = $1
                "#,
                &[&id],
            )
            .await?;

        row.as_ref().map(row_to_trade).transpose()
    }

    async fn list_by_user(&self, user: UserId) -> DbResult<Vec<Trade>> {
        let client = self.db.get_client().await?;

        let rows = client
            .query(
                r#"
                SELECT id, from_user, to_user, from_items, to_items,
                       approved_from, approved_to, status, created_at, updated_at
                FROM trades
                WHERE from_user = $1 OR to_user = $1
                ORDER BY created_at DESC
                "#,
                &[&user],
            )
            .await?;

        rows.iter().map(row_to_trade).collect()
    }

    async fn update_lines(&self, id: TradeId, side: TradeSide, lines: &[TradeLine]) -> DbResult<()> {
        let client = self.db.get_client().await?;

        // Both approvals reset in the same write as the line mutation.
        let sql = match side {
            TradeSide::From => {
                r#"
                UPDATE trades
                SET from_items = $2, approved_from = FALSE, approved_to = FALSE, updated_at = NOW()
                WHERE id = $1
                "#
            }
            TradeSide::To => {
                r#"
                UPDATE trades
                SET to_items = $2, approved_from = FALSE, approved_to = FALSE, updated_at = NOW()
                WHERE id = $1
                "#
            }
        };

        client.execute(sql, &[&id, &serde_json::to_value(lines)?]).await?;
        Ok(())
    }

    async fn approve_side(&self, id: TradeId, side: TradeSide) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        // The row lock serializes the two writes; only the one that completes
        // the pair sees the other flag already up.
        let sql = match side {
            TradeSide::From => {
                r#"
                UPDATE trades SET approved_from = TRUE, updated_at = NOW()
                WHERE id = $1 AND status = 'pending' AND NOT approved_from
                RETURNING approved_to
                "#
            }
            TradeSide::To => {
                r#"
                UPDATE trades SET approved_to = TRUE, updated_at = NOW()
                WHERE id = $1 AND status = 'pending' AND NOT approved_to
                RETURNING approved_from
                "#
            }
        };

        let row = client.query_opt(sql, &[&id]).await?;
        Ok(row.map(|r| r.get::<_, bool>(0)).unwrap_or(false))
    }

    async fn reset_approvals(&self, id: TradeId) -> DbResult<()> {
        let client = self.db.get_client().await?;

        client
            .execute(
                "UPDATE trades SET approved_from = FALSE, approved_to = FALSE, updated_at = NOW() WHERE id = $1",
                &[&id],
            )
            .await?;

        Ok(())
    }

    async fn set_status(&self, id: TradeId, status: TradeStatus) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE trades SET status = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
                &[&id, &status.as_str()],
            )
            .await?;

        Ok(updated > 0)
    }
}
