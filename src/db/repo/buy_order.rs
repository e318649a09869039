use crate::db::DbResult;
use crate::models::market::{BuyOrder, OrderFilter};
use crate::models::types::{ItemId, OrderId, UserId};

#[async_trait::async_trait]
pub trait BuyOrderRepo: Send + Sync {
    async fn insert(&self, order: &BuyOrder) -> DbResult<()>;

    async fn get(&self, id: OrderId) -> DbResult<Option<BuyOrder>>;

    /// Orders matching the filter, newest first.
    async fn query(&self, filter: &OrderFilter) -> DbResult<Vec<BuyOrder>>;

    /// Best compatible bid for a new ask: highest price wins, oldest wins
    /// ties. Only active orders with `bid_price >= ask_price` qualify.
    async fn best_bid(&self, item: ItemId, ask_price: i64) -> DbResult<Option<BuyOrder>>;

    /// Guarded `active -> cancelled` transition scoped to the buyer.
    /// False if no active order matched.
    async fn mark_cancelled(&self, id: OrderId, buyer: UserId) -> DbResult<bool>;

    /// Guarded `active -> fulfilled` transition stamping the timestamp.
    async fn mark_fulfilled(&self, id: OrderId) -> DbResult<bool>;

    /// Guarded `fulfilled -> active` transition, handing the order back when
    /// the matched listing was lost before the fill could complete.
    async fn reactivate(&self, id: OrderId) -> DbResult<bool>;
}
