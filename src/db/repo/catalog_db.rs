use crate::db::repo::CatalogRepo;
use crate::db::{Db, DbResult};
use crate::models::catalog::CatalogItem;
use crate::models::types::ItemId;
use std::sync::Arc;

pub struct CatalogRepository {
    db: Arc<Db>,
}

impl CatalogRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl CatalogRepo for CatalogRepository {
    async fn resolve(&self, item: ItemId) -> DbResult<Option<CatalogItem>> {
        let client = self.db.get_client().await?;

        let row = client
            .query_opt(
                r#"
                SELECT id, name, description, icon_hash, base_price, owner_id,
                       sellable_default, deleted
                FROM items
                WHERE id = $1
                "#,
                &[&item],
            )
            .await?;

        Ok(row.map(|row| CatalogItem {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            icon_hash: row.get("icon_hash"),
            base_price: row.get("base_price"),
            owner: row.get("owner_id"),
            sellable_default: row.get("sellable_default"),
            deleted: row.get("deleted"),
        }))
    }
}
