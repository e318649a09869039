use crate::db::repo::InventoryRepo;
use crate::error::{AppResult, DomainError};
use crate::models::inventory::{ItemStack, RemoveOutcome, StackFilter, UniqueTag};
use crate::models::types::{ItemId, StackId, UserId};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The inventory ledger: who owns how many units of what, at which cost
/// basis, with which instance metadata.
pub struct InventoryService {
    stacks: Arc<dyn InventoryRepo>,
}

impl InventoryService {
    pub fn new(stacks: Arc<dyn InventoryRepo>) -> Self {
        Self { stacks }
    }

    /// Grant `amount` units to `owner`. A metadata template turns the grant
    /// into `amount` singleton instances, each stamped with a fresh unique id;
    /// without one the units merge into the matching fungible stack.
    pub async fn add_stack(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        metadata: Option<&Map<String, Value>>,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> AppResult<Vec<ItemStack>> {
        if amount < 1 {
            return Err(DomainError::Validation {
                field: "amount",
                message: format!("must be at least 1, got {amount}"),
            });
        }

        let stacks = match metadata {
            Some(template) => {
                let mut out = Vec::with_capacity(amount as usize);
                for _ in 0..amount {
                    let tag = UniqueTag::stamp(template);
                    out.push(
                        self.stacks
                            .insert_unique(owner, item, &tag, sellable, purchase_price)
                            .await?,
                    );
                }
                out
            }
            None => {
                vec![
                    self.stacks
                        .merge_fungible(owner, item, amount, sellable, purchase_price)
                        .await?,
                ]
            }
        };

        info!(owner = %owner, item = %item, amount, unique = metadata.is_some(), "granted items");
        Ok(stacks)
    }

    /// Remove `amount` fungible units, oldest stacks first, or from one
    /// specific stack when a selector is given.
    pub async fn remove_stack(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        selector: Option<StackId>,
    ) -> AppResult<()> {
        if amount < 1 {
            return Err(DomainError::Validation {
                field: "amount",
                message: format!("must be at least 1, got {amount}"),
            });
        }

        let outcome = match selector {
            Some(stack) => self.stacks.remove_from_stack(owner, stack, amount).await?,
            None => self.stacks.remove_fungible(owner, item, amount).await?,
        };

        match outcome {
            RemoveOutcome::Removed => {
                info!(owner = %owner, item = %item, amount, "removed items");
                Ok(())
            }
            RemoveOutcome::Insufficient { have } => Err(DomainError::InsufficientQuantity {
                have,
                need: amount,
            }),
        }
    }

    /// Remove sellable units carrying the given cost-basis tag.
    pub async fn remove_sellable_at_price(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        purchase_price: Option<i64>,
    ) -> AppResult<()> {
        match self
            .stacks
            .remove_fungible_at_price(owner, item, amount, purchase_price, true)
            .await?
        {
            RemoveOutcome::Removed => Ok(()),
            RemoveOutcome::Insufficient { have } => Err(DomainError::InsufficientQuantity {
                have,
                need: amount,
            }),
        }
    }

    pub async fn remove_by_unique_id(
        &self,
        owner: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> AppResult<()> {
        if self.stacks.remove_unique(owner, item, unique_id).await? {
            info!(owner = %owner, item = %item, %unique_id, "removed unique instance");
            Ok(())
        } else {
            Err(DomainError::NotFound("unique item instance"))
        }
    }

    /// Absolute set on the owner's plain stack; `amount <= 0` clears it.
    pub async fn set_amount(&self, owner: UserId, item: ItemId, amount: i64) -> AppResult<()> {
        self.stacks.set_amount(owner, item, amount).await?;
        Ok(())
    }

    /// Stacks matching the filter. Owner-scoped queries first prune rows whose
    /// item type has been soft-deleted since.
    pub async fn query(&self, filter: &StackFilter) -> AppResult<Vec<ItemStack>> {
        if let Some(owner) = filter.owner {
            let pruned = self.stacks.prune_orphans(owner).await?;
            if pruned > 0 {
                info!(owner = %owner, pruned, "pruned orphaned stacks");
            }
        }
        Ok(self.stacks.query(filter).await?)
    }

    pub async fn transfer_unique(
        &self,
        from: UserId,
        to: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> AppResult<()> {
        if self.stacks.transfer_unique(from, to, item, unique_id).await? {
            info!(from = %from, to = %to, item = %item, %unique_id, "transferred unique instance");
            Ok(())
        } else {
            Err(DomainError::NotFound("unique item instance"))
        }
    }

    pub async fn update_metadata(
        &self,
        owner: UserId,
        item: ItemId,
        unique_id: Uuid,
        attrs: &Map<String, Value>,
    ) -> AppResult<()> {
        if self
            .stacks
            .update_metadata(owner, item, unique_id, attrs)
            .await?
        {
            Ok(())
        } else {
            Err(DomainError::NotFound("unique item instance"))
        }
    }

    /// Total untagged units of `item` owned by `owner`, across cost bases.
    pub async fn fungible_amount(&self, owner: UserId, item: ItemId) -> AppResult<i64> {
        let stacks = self
            .stacks
            .query(&StackFilter::owned_by(owner).item(item).fungible(true))
            .await?;
        Ok(stacks.iter().map(|s| s.amount).sum())
    }

    /// Total sellable units of `item` carrying the given cost-basis tag.
    pub async fn tagged_amount(
        &self,
        owner: UserId,
        item: ItemId,
        purchase_price: i64,
    ) -> AppResult<i64> {
        let stacks = self
            .stacks
            .query(
                &StackFilter::owned_by(owner)
                    .item(item)
                    .fungible(true)
                    .sellable(true)
                    .purchase_price(Some(purchase_price)),
            )
            .await?;
        Ok(stacks.iter().map(|s| s.amount).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::mem::MemStore;
    use crate::models::catalog::CatalogItem;

    fn catalog_item(id: ItemId) -> CatalogItem {
        CatalogItem {
            id,
            name: "Iron Sword".into(),
            description: "A plain sword.".into(),
            icon_hash: None,
            base_price: 100,
            owner: None,
            sellable_default: true,
            deleted: false,
        }
    }

    fn setup() -> (MemStore, InventoryService, UserId, ItemId) {
        let store = MemStore::new();
        let item = ItemId::new();
        store.insert_catalog_item(catalog_item(item));
        let svc = InventoryService::new(Arc::new(store.clone()));
        (store, svc, UserId::new(), item)
    }

    #[tokio::test]
    async fn fungible_grants_merge_into_one_stack() {
        let (_store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 3, None, true, None).await.unwrap();
        svc.add_stack(owner, item, 3, None, true, None).await.unwrap();
        svc.add_stack(owner, item, 2, None, true, None).await.unwrap();

        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].amount, 8);
    }

    #[tokio::test]
    async fn differing_cost_basis_stays_segregated() {
        let (_store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 2, None, true, Some(50)).await.unwrap();
        svc.add_stack(owner, item, 2, None, true, Some(80)).await.unwrap();

        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert_eq!(stacks.len(), 2);
        assert_eq!(svc.tagged_amount(owner, item, 50).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn identical_templates_yield_distinct_instances() {
        let (_store, svc, owner, item) = setup();

        let mut template = Map::new();
        template.insert("rarity".into(), Value::String("epic".into()));

        let stacks = svc
            .add_stack(owner, item, 3, Some(&template), true, None)
            .await
            .unwrap();

        assert_eq!(stacks.len(), 3);
        let mut ids: Vec<Uuid> = stacks.iter().filter_map(|s| s.unique_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(stacks.iter().all(|s| s.amount == 1));
    }

    #[tokio::test]
    async fn removal_shortfall_reports_available_amount() {
        let (_store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 4, None, true, None).await.unwrap();
        let err = svc.remove_stack(owner, item, 9, None).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::InsufficientQuantity { have: 4, need: 9 }
        ));
        assert_eq!(svc.fungible_amount(owner, item).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn oldest_stacks_deplete_first() {
        let (_store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 2, None, true, Some(10)).await.unwrap();
        svc.add_stack(owner, item, 5, None, true, Some(20)).await.unwrap();

        svc.remove_stack(owner, item, 3, None).await.unwrap();

        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].purchase_price, Some(20));
        assert_eq!(stacks[0].amount, 4);
    }

    #[tokio::test]
    async fn set_amount_collapses_and_clears() {
        let (_store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 2, None, true, Some(10)).await.unwrap();
        svc.add_stack(owner, item, 3, None, false, None).await.unwrap();

        svc.set_amount(owner, item, 7).await.unwrap();
        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].amount, 7);

        svc.set_amount(owner, item, 0).await.unwrap();
        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert!(stacks.is_empty());
    }

    #[tokio::test]
    async fn soft_deleted_items_are_invisible_and_pruned() {
        let (store, svc, owner, item) = setup();

        svc.add_stack(owner, item, 5, None, true, None).await.unwrap();

        let mut gone = catalog_item(item);
        gone.deleted = true;
        store.insert_catalog_item(gone);

        let stacks = svc.query(&StackFilter::owned_by(owner)).await.unwrap();
        assert!(stacks.is_empty());
    }

    #[tokio::test]
    async fn transfer_unique_moves_the_instance() {
        let (_store, svc, owner, item) = setup();
        let other = UserId::new();

        let template = Map::new();
        let stacks = svc
            .add_stack(owner, item, 1, Some(&template), true, None)
            .await
            .unwrap();
        let unique_id = stacks[0].unique_id().unwrap();

        svc.transfer_unique(owner, other, item, unique_id).await.unwrap();

        assert!(svc.query(&StackFilter::owned_by(owner)).await.unwrap().is_empty());
        let theirs = svc.query(&StackFilter::owned_by(other)).await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].unique_id(), Some(unique_id));
    }
}
