use crate::db::DbResult;
use crate::models::market::{EnrichedListing, MarketListing};
use crate::models::types::{ItemId, ListingId, UserId};

#[async_trait::async_trait]
pub trait MarketRepo: Send + Sync {
    async fn insert(&self, listing: &MarketListing) -> DbResult<()>;

    /// Any status.
    async fn get(&self, id: ListingId) -> DbResult<Option<MarketListing>>;

    /// All of a seller's listings joined with catalog details, newest first.
    async fn by_seller(&self, seller: UserId) -> DbResult<Vec<EnrichedListing>>;

    /// Active listings for an item, best deal first for a browsing buyer
    /// (price ascending, then age ascending).
    async fn active_for_item(&self, item: ItemId) -> DbResult<Vec<MarketListing>>;

    /// Active listings joined with live catalog details, paginated.
    async fn enriched(&self, limit: i64, offset: i64) -> DbResult<Vec<EnrichedListing>>;

    /// Active listings whose item name matches the term, cheapest first.
    async fn search(&self, term: &str, limit: i64) -> DbResult<Vec<EnrichedListing>>;

    /// Guarded `active -> cancelled` transition. False if not active anymore.
    async fn mark_cancelled(&self, id: ListingId) -> DbResult<bool>;

    /// Guarded `active -> sold` transition stamping buyer and timestamp.
    /// False if not active anymore (e.g. lost to a concurrent buyer).
    async fn mark_sold(&self, id: ListingId, buyer: UserId) -> DbResult<bool>;

    /// Guarded `sold -> active` transition clearing buyer and timestamp,
    /// for unwinding a sale whose unit could not be delivered.
    async fn reopen(&self, id: ListingId) -> DbResult<bool>;
}
