use crate::db::repo::InventoryRepo;
use crate::db::{Db, DbResult};
use crate::models::inventory::{
    ExchangeFailure, ExchangeOutcome, ExchangeStep, ItemStack, RemoveOutcome, StackFilter,
    UniqueTag,
};
use crate::models::types::{ItemId, StackId, UserId};
use std::sync::Arc;
use tokio_postgres::{Row, Transaction};
use uuid::Uuid;

pub struct InventoryRepository {
    db: Arc<Db>,
}

impl InventoryRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

fn row_to_stack(row: &Row) -> DbResult<ItemStack> {
    let metadata: Option<serde_json::Value> = row.get("metadata");
    let metadata: Option<UniqueTag> = metadata.map(serde_json::from_value).transpose()?;

    Ok(ItemStack {
        id: row.get("id"),
        owner: row.get("owner_id"),
        item: row.get("item_id"),
        amount: row.get("amount"),
        metadata,
        sellable: row.get("sellable"),
        purchase_price: row.get("purchase_price"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn tag_to_json(tag: &UniqueTag) -> DbResult<serde_json::Value> {
    Ok(serde_json::to_value(tag)?)
}

/// Lock the sender's fungible stacks matching an optional cost-basis tag and
/// deplete `amount` units oldest-first. Returns the depleted slices
/// (sellable, purchase_price, taken) or the available total on shortfall.
async fn deplete_fungible(
    tx: &Transaction<'_>,
    owner: UserId,
    item: ItemId,
    amount: i64,
    price_filter: Option<Option<i64>>,
    sellable_only: bool,
) -> DbResult<Result<Vec<(bool, Option<i64>, i64)>, i64>> {
    let rows = tx
        .query(
            r#"
            SELECT id, amount, sellable, purchase_price
            FROM stacks
            WHERE owner_id = $1
              AND item_id = $2
              AND metadata IS NULL
              AND (NOT $3 OR purchase_price IS NOT DISTINCT FROM $4)
              AND (NOT $5 OR sellable)
            ORDER BY created_at
            FOR UPDATE
            "#,
            &[
                &owner,
                &item,
                &price_filter.is_some(),
                &price_filter.flatten(),
                &sellable_only,
            ],
        )
        .await?;

    let have: i64 = rows.iter().map(|r| r.get::<_, i64>("amount")).sum();
    if have < amount {
        return Ok(Err(have));
    }

    let mut remaining = amount;
    let mut taken = Vec::new();
    for row in &rows {
        if remaining <= 0 {
            break;
        }
        let id: StackId = row.get("id");
        let stack_amount: i64 = row.get("amount");
        let take = remaining.min(stack_amount);

        if take == stack_amount {
            tx.execute("DELETE FROM stacks WHERE id = $1", &[&id]).await?;
        } else {
            tx.execute(
                "UPDATE stacks SET amount = amount - $2, updated_at = NOW() WHERE id = $1",
                &[&id, &take],
            )
            .await?;
        }

        taken.push((row.get("sellable"), row.get("purchase_price"), take));
        remaining -= take;
    }

    Ok(Ok(taken))
}

/// Merge units into the recipient's matching fungible stack under the same
/// transaction, creating the row if absent.
async fn merge_fungible_tx(
    tx: &Transaction<'_>,
    owner: UserId,
    item: ItemId,
    amount: i64,
    sellable: bool,
    purchase_price: Option<i64>,
) -> DbResult<()> {
    let updated = tx
        .execute(
            r#"
            UPDATE stacks SET amount = amount + $3, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM stacks
                WHERE owner_id = $1 AND item_id = $2 AND metadata IS NULL
                  AND sellable = $4 AND purchase_price IS NOT DISTINCT FROM $5
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE
            )
            "#,
            &[&owner, &item, &amount, &sellable, &purchase_price],
        )
        .await?;

    if updated == 0 {
        tx.execute(
            r#"
            INSERT INTO stacks (id, owner_id, item_id, amount, metadata, sellable, purchase_price)
            VALUES ($1, $2, $3, $4, NULL, $5, $6)
            "#,
            &[&StackId::new(), &owner, &item, &amount, &sellable, &purchase_price],
        )
        .await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl InventoryRepo for InventoryRepository {
    async fn query(&self, filter: &StackFilter) -> DbResult<Vec<ItemStack>> {
        let client = self.db.get_client().await?;

        let unique_id = filter.unique_id.map(|u| u.to_string());
        let rows = client
            .query(
                r#"
                SELECT s.id, s.owner_id, s.item_id, s.amount, s.metadata,
                       s.sellable, s.purchase_price, s.created_at, s.updated_at
                FROM stacks s
                JOIN items i ON i.id = s.item_id AND NOT i.deleted
                WHERE ($1::uuid IS NULL OR s.owner_id = $1)
                  AND ($2::uuid IS NULL OR s.item_id = $2)
                  AND ($3::bool IS NULL OR s.sellable = $3)
                  AND (NOT $4 OR s.purchase_price IS NOT DISTINCT FROM $5)
                  AND ($6::text IS NULL OR s.metadata->>'_unique_id' = $6)
                  AND ($7::bool IS NULL OR (s.metadata IS NULL) = $7)
                  AND ($8::bigint IS NULL OR s.amount >= $8)
                ORDER BY s.created_at
                "#,
                &[
                    &filter.owner,
                    &filter.item,
                    &filter.sellable,
                    &filter.purchase_price.is_some(),
                    &filter.purchase_price.flatten(),
                    &unique_id,
                    &filter.fungible,
                    &filter.min_amount,
                ],
            )
            .await?;

        rows.iter().map(row_to_stack).collect()
    }

    async fn prune_orphans(&self, owner: UserId) -> DbResult<u64> {
        let client = self.db.get_client().await?;

        let pruned = client
            .execute(
                r#"
                DELETE FROM stacks
                WHERE owner_id = $1
                  AND item_id NOT IN (SELECT id FROM items WHERE NOT deleted)
                "#,
                &[&owner],
            )
            .await?;

        Ok(pruned)
    }

    async fn merge_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        merge_fungible_tx(&tx, owner, item, amount, sellable, purchase_price).await?;

        let row = tx
            .query_one(
                r#"
                SELECT id, owner_id, item_id, amount, metadata, sellable, purchase_price,
                       created_at, updated_at
                FROM stacks
                WHERE owner_id = $1 AND item_id = $2 AND metadata IS NULL
                  AND sellable = $3 AND purchase_price IS NOT DISTINCT FROM $4
                ORDER BY created_at
                LIMIT 1
                "#,
                &[&owner, &item, &sellable, &purchase_price],
            )
            .await?;
        let stack = row_to_stack(&row)?;

        tx.commit().await?;
        Ok(stack)
    }

    async fn insert_unique(
        &self,
        owner: UserId,
        item: ItemId,
        tag: &UniqueTag,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack> {
        let client = self.db.get_client().await?;

        let row = client
            .query_one(
                r#"
                INSERT INTO stacks (id, owner_id, item_id, amount, metadata, sellable, purchase_price)
                VALUES ($1, $2, $3, 1, $4, $5, $6)
                RETURNING id, owner_id, item_id, amount, metadata, sellable, purchase_price,
                          created_at, updated_at
                "#,
                &[&StackId::new(), &owner, &item, &tag_to_json(tag)?, &sellable, &purchase_price],
            )
            .await?;

        row_to_stack(&row)
    }

    async fn remove_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
    ) -> DbResult<RemoveOutcome> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        match deplete_fungible(&tx, owner, item, amount, None, false).await? {
            Ok(_) => {
                tx.commit().await?;
                Ok(RemoveOutcome::Removed)
            }
            Err(have) => Ok(RemoveOutcome::Insufficient { have }),
        }
    }

    async fn remove_fungible_at_price(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        purchase_price: Option<i64>,
        sellable_only: bool,
    ) -> DbResult<RemoveOutcome> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        match deplete_fungible(&tx, owner, item, amount, Some(purchase_price), sellable_only).await? {
            Ok(_) => {
                tx.commit().await?;
                Ok(RemoveOutcome::Removed)
            }
            Err(have) => Ok(RemoveOutcome::Insufficient { have }),
        }
    }

    async fn remove_from_stack(
        &self,
        owner: UserId,
        stack: StackId,
        amount: i64,
    ) -> DbResult<RemoveOutcome> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                r#"
                SELECT amount FROM stacks
                WHERE id = $1 AND owner_id = $2 AND metadata IS NULL
                FOR UPDATE
                "#,
                &[&stack, &owner],
            )
            .await?;

        let Some(row) = row else {
            return Ok(RemoveOutcome::Insufficient { have: 0 });
        };

        let have: i64 = row.get("amount");
        if have < amount {
            return Ok(RemoveOutcome::Insufficient { have });
        }

        if have == amount {
            tx.execute("DELETE FROM stacks WHERE id = $1", &[&stack]).await?;
        } else {
            tx.execute(
                "UPDATE stacks SET amount = amount - $2, updated_at = NOW() WHERE id = $1",
                &[&stack, &amount],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(RemoveOutcome::Removed)
    }

    async fn remove_unique(&self, owner: UserId, item: ItemId, unique_id: Uuid) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let deleted = client
            .execute(
                r#"
                DELETE FROM stacks
                WHERE owner_id = $1 AND item_id = $2 AND metadata->>'_unique_id' = $3
                "#,
                &[&owner, &item, &unique_id.to_string()],
            )
            .await?;

        Ok(deleted > 0)
    }

    async fn set_amount(&self, owner: UserId, item: ItemId, amount: i64) -> DbResult<()> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        // Collapse all untagged rows for the item into one absolute amount.
        tx.execute(
            "DELETE FROM stacks WHERE owner_id = $1 AND item_id = $2 AND metadata IS NULL",
            &[&owner, &item],
        )
        .await?;

        if amount > 0 {
            tx.execute(
                r#"
                INSERT INTO stacks (id, owner_id, item_id, amount, metadata, sellable, purchase_price)
                VALUES ($1, $2, $3, $4, NULL, TRUE, NULL)
                "#,
                &[&StackId::new(), &owner, &item, &amount],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_metadata(
        &self,
        owner: UserId,
        item: ItemId,
        unique_id: Uuid,
        attrs: &serde_json::Map<String, serde_json::Value>,
    ) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let tag = UniqueTag {
            unique_id,
            attrs: {
                let mut attrs = attrs.clone();
                attrs.remove("_unique_id");
                attrs
            },
        };

        let updated = client
            .execute(
                r#"
                UPDATE stacks SET metadata = $4, updated_at = NOW()
                WHERE owner_id = $1 AND item_id = $2 AND metadata->>'_unique_id' = $3
                "#,
                &[&owner, &item, &unique_id.to_string(), &tag_to_json(&tag)?],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn transfer_unique(
        &self,
        from: UserId,
        to: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE stacks SET owner_id = $2, updated_at = NOW()
                WHERE owner_id = $1 AND item_id = $3 AND metadata->>'_unique_id' = $4
                "#,
                &[&from, &to, &item, &unique_id.to_string()],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn exchange(&self, steps: &[ExchangeStep]) -> DbResult<ExchangeOutcome> {
        let mut client = self.db.get_client().await?;
        let tx = client.transaction().await?;

        for (idx, step) in steps.iter().enumerate() {
            match step {
                ExchangeStep::TransferUnique { from, to, item, unique_id } => {
                    let updated = tx
                        .execute(
                            r#"
                            UPDATE stacks SET owner_id = $2, updated_at = NOW()
                            WHERE owner_id = $1 AND item_id = $3 AND metadata->>'_unique_id' = $4
                            "#,
                            &[from, to, item, &unique_id.to_string()],
                        )
                        .await?;
                    if updated == 0 {
                        // Dropping the transaction rolls back prior steps.
                        return Ok(ExchangeOutcome::Failed {
                            step: idx,
                            reason: ExchangeFailure::MissingUnique,
                        });
                    }
                }
                ExchangeStep::MoveTagged { from, to, item, amount, purchase_price } => {
                    match deplete_fungible(&tx, *from, *item, *amount, Some(Some(*purchase_price)), true)
                        .await?
                    {
                        Ok(_) => {
                            merge_fungible_tx(&tx, *to, *item, *amount, true, Some(*purchase_price))
                                .await?;
                        }
                        Err(have) => {
                            return Ok(ExchangeOutcome::Failed {
                                step: idx,
                                reason: ExchangeFailure::Insufficient { have, need: *amount },
                            });
                        }
                    }
                }
                ExchangeStep::MovePlain { from, to, item, amount } => {
                    match deplete_fungible(&tx, *from, *item, *amount, None, false).await? {
                        Ok(taken) => {
                            for (sellable, purchase_price, moved) in taken {
                                merge_fungible_tx(&tx, *to, *item, moved, sellable, purchase_price)
                                    .await?;
                            }
                        }
                        Err(have) => {
                            return Ok(ExchangeOutcome::Failed {
                                step: idx,
                                reason: ExchangeFailure::Insufficient { have, need: *amount },
                            });
                        }
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(ExchangeOutcome::Applied)
    }
}
