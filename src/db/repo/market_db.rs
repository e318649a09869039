use crate::db::error::DbError;
use crate::db::repo::MarketRepo;
use crate::db::{Db, DbResult};
use crate::models::inventory::UniqueTag;
use crate::models::market::{EnrichedListing, ListingStatus, MarketListing};
use crate::models::types::{ItemId, ListingId, UserId};
use std::sync::Arc;
use tokio_postgres::Row;

pub struct MarketRepository {
    db: Arc<Db>,
}

impl MarketRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

const LISTING_COLS: &str = "ml.id, ml.seller_id, ml.item_id, ml.ask_price, ml.purchase_price, \
     ml.status, ml.metadata, ml.sellable, ml.buyer_id, ml.sold_at, ml.created_at, ml.updated_at";

fn row_to_listing(row: &Row) -> DbResult<MarketListing> {
    let status: String = row.get("status");
    let status = ListingStatus::parse(&status)
        .ok_or_else(|| DbError::Decode(format!("unknown listing status '{status}'")))?;

    let metadata: Option<serde_json::Value> = row.get("metadata");
    let metadata: Option<UniqueTag> = metadata.map(serde_json::from_value).transpose()?;

    Ok(MarketListing {
        id: row.get("id"),
        seller: row.get("seller_id"),
        item: row.get("item_id"),
        ask_price: row.get("ask_price"),
        purchase_price: row.get("purchase_price"),
        status,
        metadata,
        sellable: row.get("sellable"),
        buyer: row.get("buyer_id"),
        sold_at: row.get("sold_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_enriched(row: &Row) -> DbResult<EnrichedListing> {
    Ok(EnrichedListing {
        listing: row_to_listing(row)?,
        item_name: row.get("item_name"),
        item_description: row.get("item_description"),
        item_icon_hash: row.get("item_icon_hash"),
    })
}

#[async_trait::async_trait]
impl MarketRepo for MarketRepository {
    async fn insert(&self, listing: &MarketListing) -> DbResult<()> {
        let client = self.db.get_client().await?;

        let metadata = listing
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        client
            .execute(
                r#"
                INSERT INTO market_listings
                    (id, seller_id, item_id, ask_price, purchase_price, status, metadata,
                     sellable, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
                &[
                    &listing.id,
                    &listing.seller,
                    &listing.item,
                    &listing.ask_price,
                    &listing.purchase_price,
                    &listing.status.as_str(),
                    &metadata,
                    &listing.sellable,
                    &listing.created_at,
                    &listing.updated_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: ListingId) -> DbResult<Option<MarketListing>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt(
                &format!("SELECT {LISTING_COLS} FROM market_listings ml WHERE ml.id = $1"),
                &[&id],
            )
            .await?;

        row.as_ref().map(row_to_listing).transpose()
    }

    async fn by_seller(&self, seller: UserId) -> DbResult<Vec<EnrichedListing>> {
        let client = self.db.get_client().await?;

        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LISTING_COLS},
                           i.name AS item_name,
                           i.description AS item_description,
                           i.icon_hash AS item_icon_hash
                    FROM market_listings ml
                    JOIN items i ON i.id = ml.item_id
                    WHERE ml.seller_id = $1
                    ORDER BY ml.created_at DESC
                    "#
                ),
                &[&seller],
            )
            .await?;

        rows.iter().map(row_to_enriched).collect()
    }

    async fn active_for_item(&self, item: ItemId) -> DbResult<Vec<MarketListing>> {
        let client = self.db.get_client().await?;

        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LISTING_COLS} FROM market_listings ml
                    WHERE ml.item_id = $1 AND ml.status = 'active'
                    ORDER BY ml.ask_price, ml.created_at
                    "#
                ),
                &[&item],
            )
            .await?;

        rows.iter().map(row_to_listing).collect()
    }

    async fn enriched(&self, limit: i64, offset: i64) -> DbResult<Vec<EnrichedListing>> {
        let client = self.db.get_client().await?;

        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LISTING_COLS},
                           i.name AS item_name,
                           i.description AS item_description,
                           i.icon_hash AS item_icon_hash
                    FROM market_listings ml
                    JOIN items i ON i.id = ml.item_id AND NOT i.deleted
                    WHERE ml.status = 'active'
                    ORDER BY ml.created_at DESC
                    LIMIT $1 OFFSET $2
                    "#
                ),
                &[&limit, &offset],
            )
            .await?;

        rows.iter().map(row_to_enriched).collect()
    }

    async fn search(&self, term: &str, limit: i64) -> DbResult<Vec<EnrichedListing>> {
        let client = self.db.get_client().await?;

        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LISTING_COLS},
                           i.name AS item_name,
                           i.description AS item_description,
                           i.icon_hash AS item_icon_hash
                    FROM market_listings ml
                    JOIN items i ON i.id = ml.item_id AND NOT i.deleted
                    WHERE ml.status = 'active' AND i.name ILIKE '%' || $1 || '%'
                    ORDER BY ml.ask_price, ml.created_at
                    LIMIT $2
                    "#
                ),
                &[&term, &limit],
            )
            .await?;

        rows.iter().map(row_to_enriched).collect()
    }

    async fn mark_cancelled(&self, id: ListingId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE market_listings SET status = 'cancelled', updated_at = NOW()
                WHERE id = $1 AND status = 'active'
                "#,
                &[&id],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn mark_sold(&self, id: ListingId, buyer: UserId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE market_listings
                SET status = 'sold', buyer_id = $2, sold_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND status = 'active'
                "#,
                &[&id, &buyer],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn reopen(&self, id: ListingId) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let updated = client
            .execute(
                r#"
                UPDATE market_listings
                SET status = 'active', buyer_id = NULL, sold_at = NULL, updated_at = NOW()
                WHERE id = $1 AND status = 'sold'
                "#,
                &[&id],
            )
            .await?;

        Ok(updated > 0)
    }
}
