use crate::db::DbResult;
use crate::models::types::UserId;

/// Result of an atomic balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    Applied { new_balance: i64 },
    /// The debit would have taken the balance below zero; nothing changed.
    Insufficient { balance: i64 },
}

/// Client for the external user/balance store. Credits and debits are single
/// conditional writes; the engine never reads-then-writes a balance.
#[async_trait::async_trait]
pub trait BalanceRepo: Send + Sync {
    async fn balance(&self, user: UserId) -> DbResult<i64>;

    /// Apply `delta` (negative = debit) iff the result stays >= 0.
    async fn adjust(&self, user: UserId, delta: i64) -> DbResult<AdjustOutcome>;
}
