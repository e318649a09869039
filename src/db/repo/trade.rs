use crate::db::DbResult;
use crate::models::trade::{Trade, TradeLine, TradeSide, TradeStatus};
use crate::models::types::{TradeId, UserId};

#[async_trait::async_trait]
pub trait TradeRepo: Send + Sync {
    /// The pending trade between the pair, order-independent.
    async fn find_pending_between(&self, a: UserId, b: UserId) -> DbResult<Option<Trade>>;

    async fn insert(&self, trade: &Trade) -> DbResult<()>;

    async fn get(&self, id: TradeId) -> DbResult<Option<Trade>>;

    /// All trades the user is a party of, newest first.
    async fn list_by_user(&self, user: UserId) -> DbResult<Vec<Trade>>;

    /// Replace one side's item list. Both approval flags are cleared in the
    /// same write, per the negotiation invariant.
    async fn update_lines(&self, id: TradeId, side: TradeSide, lines: &[TradeLine]) -> DbResult<()>;

    /// Turn on one side's approval flag. Guarded on the pending status and on
    /// the flag being clear, so each flag is set by exactly one write per
    /// negotiation round. Returns true only when this write set the second
    /// flag; that caller owns settlement.
    async fn approve_side(&self, id: TradeId, side: TradeSide) -> DbResult<bool>;

    async fn reset_approvals(&self, id: TradeId) -> DbResult<()>;

    /// Guarded terminal transition: only applies while the trade is pending.
    /// Returns false if the row was not pending anymore.
    async fn set_status(&self, id: TradeId, status: TradeStatus) -> DbResult<bool>;
}
