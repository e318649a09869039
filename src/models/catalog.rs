use crate::models::types::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// Item type as the external catalog resolves it. The economy engine never
/// owns these rows; it only reads them to validate references, join display
/// details and price store transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub icon_hash: Option<String>,

    /// Store price for direct purchases.
    pub base_price: i64,

    /// Creator credited with the payout share on store purchases.
    pub owner: Option<UserId>,

    /// Default sellability for stacks acquired through the store.
    pub sellable_default: bool,

    /// Soft-deleted items are invisible to inventory queries and unlistable.
    pub deleted: bool,
}

impl CatalogItem {
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}
