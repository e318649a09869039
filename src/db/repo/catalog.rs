use crate::db::DbResult;
use crate::models::catalog::CatalogItem;
use crate::models::types::ItemId;

/// Client for the external item catalog. The economy engine only reads it.
#[async_trait::async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Resolve an item type, including soft-deleted ones (callers decide how
    /// to treat the `deleted` flag).
    async fn resolve(&self, item: ItemId) -> DbResult<Option<CatalogItem>>;
}
