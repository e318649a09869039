use crate::db::error::DbError;
use crate::db::repo::{AdjustOutcome, BalanceRepo};
use crate::db::{Db, DbResult};
use crate::models::types::UserId;
use std::sync::Arc;

pub struct BalanceRepository {
    db: Arc<Db>,
}

impl BalanceRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl BalanceRepo for BalanceRepository {
    async fn balance(&self, user: UserId) -> DbResult<i64> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt("SELECT balance FROM users WHERE id = $1", &[&user])
            .await?;

        row.map(|r| r.get("balance")).ok_or(DbError::NotFound)
    }

    async fn adjust(&self, user: UserId, delta: i64) -> DbResult<AdjustOutcome> {
        let client = self.db.get_client().await?;

        // Single conditional write: no read-then-write gap.
        let row = client
            .query_opt(
                r#"
                UPDATE users SET balance = balance + $2, updated_at = NOW()
                WHERE id = $1 AND balance + $2 >= 0
                RETURNING balance
                "#,
                &[&user, &delta],
            )
            .await?;

        match row {
            Some(row) => Ok(AdjustOutcome::Applied {
                new_balance: row.get("balance"),
            }),
            None => {
                let balance = self.balance(user).await?;
                Ok(AdjustOutcome::Insufficient { balance })
            }
        }
    }
}
