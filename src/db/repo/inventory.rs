use crate::db::DbResult;
use crate::models::inventory::{
    ExchangeOutcome, ExchangeStep, ItemStack, RemoveOutcome, StackFilter, UniqueTag,
};
use crate::models::types::{ItemId, StackId, UserId};
use uuid::Uuid;

/// Storage contract of the inventory ledger.
///
/// Every mutating operation is a single atomic read-check-write: concurrent
/// calls against the same owner's stacks must not both pass their quantity
/// checks. Shortfalls are reported through [`RemoveOutcome`] rather than
/// committed partially.
#[async_trait::async_trait]
pub trait InventoryRepo: Send + Sync {
    /// Stacks matching the filter, joined against the live item catalog so
    /// soft-deleted item types are invisible. Oldest stacks first.
    async fn query(&self, filter: &StackFilter) -> DbResult<Vec<ItemStack>>;

    /// Delete an owner's stacks whose item type has been soft-deleted.
    /// Returns the number of rows pruned.
    async fn prune_orphans(&self, owner: UserId) -> DbResult<u64>;

    /// Merge `amount` units into the matching fungible stack keyed by
    /// (owner, item, sellable, purchase_price), creating it if absent.
    async fn merge_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack>;

    /// Insert a singleton non-fungible stack carrying the given tag verbatim.
    async fn insert_unique(
        &self,
        owner: UserId,
        item: ItemId,
        tag: &UniqueTag,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack>;

    /// Deplete `amount` units across the owner's fungible stacks of `item`,
    /// oldest first. Stacks reaching 0 are deleted.
    async fn remove_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
    ) -> DbResult<RemoveOutcome>;

    /// Deplete `amount` units across the owner's fungible stacks carrying the
    /// given cost-basis tag, optionally restricted to sellable stacks.
    async fn remove_fungible_at_price(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        purchase_price: Option<i64>,
        sellable_only: bool,
    ) -> DbResult<RemoveOutcome>;

    /// Deplete `amount` units from one specific stack.
    async fn remove_from_stack(
        &self,
        owner: UserId,
        stack: StackId,
        amount: i64,
    ) -> DbResult<RemoveOutcome>;

    /// Delete the singleton stack carrying `unique_id`. Returns false if the
    /// owner has no such stack.
    async fn remove_unique(&self, owner: UserId, item: ItemId, unique_id: Uuid) -> DbResult<bool>;

    /// Absolute set on the owner's no-metadata stack of `item`; `amount <= 0`
    /// deletes the row(s).
    async fn set_amount(&self, owner: UserId, item: ItemId, amount: i64) -> DbResult<()>;

    /// Replace the attrs of a tagged instance, keeping its unique id.
    async fn update_metadata(
        &self,
        owner: UserId,
        item: ItemId,
        unique_id: Uuid,
        attrs: &serde_json::Map<String, serde_json::Value>,
    ) -> DbResult<bool>;

    /// Reassign ownership of a singleton tagged stack. Returns false if the
    /// sender has no such stack.
    async fn transfer_unique(
        &self,
        from: UserId,
        to: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> DbResult<bool>;

    /// Execute a trade swap as one atomic unit: either every step applies or
    /// none do. Quantity checks run against locked rows inside the unit.
    async fn exchange(&self, steps: &[ExchangeStep]) -> DbResult<ExchangeOutcome>;
}
