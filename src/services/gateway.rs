use crate::config::Config;
use crate::db::error::DbError;
use crate::db::repo::{AdjustOutcome, BalanceRepo, CatalogRepo};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::CatalogItem;
use crate::models::inventory::{ItemStack, StackFilter};
use crate::models::market::{BuyOrder, MarketListing, OrderFilter};
use crate::models::trade::{Trade, TradeLine};
use crate::models::types::{ItemId, ListingId, OrderId, TradeId, UserId};
use crate::services::{InventoryService, MarketService, TradeService, TradeView};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::market::{refund_purchase, settle_purchase};

/// The single entry point callers go through: validates against the item
/// catalog, moves currency through the balance store, and delegates the
/// inventory/trade/market work to the owning service.
pub struct EconomyGateway {
    inventory: Arc<InventoryService>,
    trades: Arc<TradeService>,
    market: Arc<MarketService>,
    catalog: Arc<dyn CatalogRepo>,
    balances: Arc<dyn BalanceRepo>,
    config: Config,
}

impl EconomyGateway {
    pub fn new(
        inventory: Arc<InventoryService>,
        trades: Arc<TradeService>,
        market: Arc<MarketService>,
        catalog: Arc<dyn CatalogRepo>,
        balances: Arc<dyn BalanceRepo>,
        config: Config,
    ) -> Self {
        Self {
            inventory,
            trades,
            market,
            catalog,
            balances,
            config,
        }
    }

    /// Resolve an item type, treating soft-deleted entries as absent.
    pub async fn resolve_item(&self, item: ItemId) -> AppResult<CatalogItem> {
        self.catalog
            .resolve(item)
            .await?
            .filter(CatalogItem::is_live)
            .ok_or(DomainError::NotFound("item"))
    }

    pub async fn balance(&self, user: UserId) -> AppResult<i64> {
        match self.balances.balance(user).await {
            Ok(balance) => Ok(balance),
            Err(DbError::NotFound) => Err(DomainError::NotFound("user")),
            Err(e) => Err(e.into()),
        }
    }

    /// Grant items outside any sale (rewards, admin tooling). Sellability
    /// follows the catalog default; granted units carry no cost basis.
    pub async fn grant_items(
        &self,
        user: UserId,
        item: ItemId,
        amount: i64,
        metadata: Option<&Map<String, Value>>,
    ) -> AppResult<Vec<ItemStack>> {
        let entry = self.resolve_item(item).await?;
        self.inventory
            .add_stack(user, item, amount, metadata, entry.sellable_default, None)
            .await
    }

    pub async fn revoke_items(&self, user: UserId, item: ItemId, amount: i64) -> AppResult<()> {
        self.inventory.remove_stack(user, item, amount, None).await
    }

    pub async fn revoke_unique(
        &self,
        user: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> AppResult<()> {
        self.inventory.remove_by_unique_id(user, item, unique_id).await
    }

    pub async fn inventory_of(&self, user: UserId) -> AppResult<Vec<ItemStack>> {
        self.inventory.query(&StackFilter::owned_by(user)).await
    }

    pub async fn open_trade(&self, from: UserId, to: UserId) -> AppResult<Trade> {
        self.trades.start_or_get_pending(from, to).await
    }

    pub async fn propose_trade_item(
        &self,
        trade: TradeId,
        actor: UserId,
        line: TradeLine,
    ) -> AppResult<Trade> {
        self.trades.add_item(trade, actor, line).await
    }

    pub async fn withdraw_trade_item(
        &self,
        trade: TradeId,
        actor: UserId,
        item: ItemId,
        amount: i64,
        unique_id: Option<Uuid>,
        purchase_price: Option<i64>,
    ) -> AppResult<Trade> {
        self.trades
            .remove_item(trade, actor, item, amount, unique_id, purchase_price)
            .await
    }

    pub async fn approve_trade(&self, trade: TradeId, actor: UserId) -> AppResult<Trade> {
        self.trades.approve(trade, actor).await
    }

    pub async fn cancel_trade(&self, trade: TradeId, actor: UserId) -> AppResult<Trade> {
        self.trades.cancel(trade, actor).await
    }

    pub async fn trade_view(&self, trade: TradeId) -> AppResult<TradeView> {
        self.trades.view(trade).await
    }

    pub async fn trades_of(&self, user: UserId) -> AppResult<Vec<Trade>> {
        self.trades.list_by_user(user).await
    }

    pub async fn list_item_for_sale(
        &self,
        seller: UserId,
        item: ItemId,
        ask_price: i64,
        unique_id: Option<Uuid>,
    ) -> AppResult<MarketListing> {
        self.market
            .create_listing(seller, item, ask_price, unique_id)
            .await
    }

    /// Buy an active listing: debit the buyer the full ask, credit the seller
    /// the payout share, then hand over the unit. Losing the listing to a
    /// concurrent buyer refunds the settlement.
    pub async fn buy_listing(&self, buyer: UserId, id: ListingId) -> AppResult<MarketListing> {
        let listing = self.market.get(id).await?;
        if listing.seller == buyer {
            return Err(DomainError::Validation {
                field: "buyer",
                message: "cannot buy your own listing".into(),
            });
        }

        settle_purchase(
            &self.balances,
            &self.config,
            buyer,
            listing.seller,
            listing.ask_price,
        )
        .await?;

        match self.market.buy_listing(id, buyer).await {
            Ok(sold) => Ok(sold),
            Err(e) => {
                refund_purchase(
                    &self.balances,
                    &self.config,
                    buyer,
                    listing.seller,
                    listing.ask_price,
                )
                .await?;
                Err(e)
            }
        }
    }

    pub async fn cancel_listing(&self, seller: UserId, id: ListingId) -> AppResult<MarketListing> {
        self.market.cancel_listing(id, seller).await
    }

    pub async fn place_buy_order(
        &self,
        buyer: UserId,
        item: ItemId,
        bid_price: i64,
    ) -> AppResult<BuyOrder> {
        self.market.create_buy_order(buyer, item, bid_price).await
    }

    pub async fn cancel_buy_order(&self, buyer: UserId, id: OrderId) -> AppResult<BuyOrder> {
        self.market.cancel_buy_order(id, buyer).await
    }

    pub async fn buy_orders_of(&self, buyer: UserId) -> AppResult<Vec<BuyOrder>> {
        self.market
            .orders(&OrderFilter {
                buyer: Some(buyer),
                ..Default::default()
            })
            .await
    }

    /// Store-front purchase at catalog price. The item's creator, when there
    /// is one, receives the payout share; the units arrive sellable with the
    /// catalog price as cost basis.
    pub async fn buy_store_item(
        &self,
        buyer: UserId,
        item: ItemId,
        amount: i64,
    ) -> AppResult<Vec<ItemStack>> {
        let entry = self.resolve_item(item).await?;
        if amount < 1 {
            return Err(DomainError::Validation {
                field: "amount",
                message: format!("must be at least 1, got {amount}"),
            });
        }

        let cost = entry
            .base_price
            .checked_mul(amount)
            .ok_or(DomainError::Validation {
                field: "amount",
                message: "total price overflows".into(),
            })?;
        match self.balances.adjust(buyer, -cost).await? {
            AdjustOutcome::Applied { .. } => {}
            AdjustOutcome::Insufficient { balance } => {
                return Err(DomainError::InsufficientFunds {
                    balance,
                    required: cost,
                });
            }
        }
        if let Some(creator) = entry.owner {
            self.balances
                .adjust(creator, self.config.seller_payout(cost))
                .await?;
        }

        let stacks = self
            .inventory
            .add_stack(buyer, item, amount, None, true, Some(entry.base_price))
            .await?;
        info!(buyer = %buyer, item = %item, amount, cost, "store purchase");
        Ok(stacks)
    }

    /// Sell store-bought units back at the payout share of their cost basis.
    pub async fn sell_store_item(
        &self,
        user: UserId,
        item: ItemId,
        amount: i64,
    ) -> AppResult<i64> {
        let entry = self.resolve_item(item).await?;
        if amount < 1 {
            return Err(DomainError::Validation {
                field: "amount",
                message: format!("must be at least 1, got {amount}"),
            });
        }

        let gross = entry
            .base_price
            .checked_mul(amount)
            .ok_or(DomainError::Validation {
                field: "amount",
                message: "total price overflows".into(),
            })?;

        self.inventory
            .remove_sellable_at_price(user, item, amount, Some(entry.base_price))
            .await?;

        let payout = self.config.seller_payout(gross);
        self.balances.adjust(user, payout).await?;
        info!(user = %user, item = %item, amount, payout, "store sell-back");
        Ok(payout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::mem::MemStore;
    use crate::registry::Registry;

    fn catalog_item(id: ItemId, creator: Option<UserId>) -> CatalogItem {
        CatalogItem {
            id,
            name: "Potion".into(),
            description: String::new(),
            icon_hash: None,
            base_price: 100,
            owner: creator,
            sellable_default: true,
            deleted: false,
        }
    }

    fn setup() -> (MemStore, Arc<EconomyGateway>, UserId, UserId, ItemId) {
        let (registry, store) = Registry::in_memory(Config::default());
        let item = ItemId::new();
        let creator = UserId::new();
        store.insert_catalog_item(catalog_item(item, Some(creator)));
        store.set_balance(creator, 0);

        let user = UserId::new();
        store.set_balance(user, 1_000);

        (store, registry.services.gateway, user, creator, item)
    }

    #[tokio::test]
    async fn store_purchase_moves_currency_and_items() {
        let (store, gateway, user, creator, item) = setup();

        gateway.buy_store_item(user, item, 3).await.unwrap();

        assert_eq!(store.balance(user).await.unwrap(), 700);
        assert_eq!(store.balance(creator).await.unwrap(), 225);

        let stacks = gateway.inventory_of(user).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].amount, 3);
        assert_eq!(stacks[0].purchase_price, Some(100));
        assert!(stacks[0].sellable);
    }

    #[tokio::test]
    async fn store_purchase_requires_funds() {
        let (store, gateway, user, _, item) = setup();
        store.set_balance(user, 50);

        let err = gateway.buy_store_item(user, item, 1).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientFunds {
                balance: 50,
                required: 100
            }
        ));
        assert!(gateway.inventory_of(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn absurd_store_amounts_are_rejected() {
        let (store, gateway, user, _, item) = setup();

        let err = gateway
            .buy_store_item(user, item, i64::MAX / 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "amount", .. }));
        assert_eq!(store.balance(user).await.unwrap(), 1_000);

        let err = gateway
            .sell_store_item(user, item, i64::MAX / 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "amount", .. }));
    }

    #[tokio::test]
    async fn sell_back_pays_the_payout_share() {
        let (store, gateway, user, _, item) = setup();

        gateway.buy_store_item(user, item, 2).await.unwrap();
        let payout = gateway.sell_store_item(user, item, 2).await.unwrap();

        assert_eq!(payout, 150);
        assert_eq!(store.balance(user).await.unwrap(), 950);
        assert!(gateway.inventory_of(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn granted_items_cannot_be_sold_back() {
        let (_store, gateway, user, _, item) = setup();

        gateway.grant_items(user, item, 2, None).await.unwrap();

        let err = gateway.sell_store_item(user, item, 2).await.unwrap_err();
        assert!(matches!(err, DomainError::InsufficientQuantity { .. }));
    }

    #[tokio::test]
    async fn buying_a_listing_settles_both_parties() {
        let (store, gateway, buyer, _, item) = setup();
        let seller = UserId::new();
        store.set_balance(seller, 0);

        gateway.grant_items(seller, item, 1, None).await.unwrap();
        let listing = gateway
            .list_item_for_sale(seller, item, 200, None)
            .await
            .unwrap();

        gateway.buy_listing(buyer, listing.id).await.unwrap();

        assert_eq!(store.balance(buyer).await.unwrap(), 800);
        assert_eq!(store.balance(seller).await.unwrap(), 150);
        let stacks = gateway.inventory_of(buyer).await.unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].amount, 1);
    }

    #[tokio::test]
    async fn insolvent_buyer_leaves_the_listing_untouched() {
        let (store, gateway, buyer, _, item) = setup();
        store.set_balance(buyer, 10);
        let seller = UserId::new();
        store.set_balance(seller, 0);

        gateway.grant_items(seller, item, 1, None).await.unwrap();
        let listing = gateway
            .list_item_for_sale(seller, item, 200, None)
            .await
            .unwrap();

        let err = gateway.buy_listing(buyer, listing.id).await.unwrap_err();
        assert!(matches!(err, DomainError::InsufficientFunds { .. }));

        assert_eq!(store.balance(buyer).await.unwrap(), 10);
        assert_eq!(store.balance(seller).await.unwrap(), 0);
        let listing = gateway.market.get(listing.id).await.unwrap();
        assert_eq!(listing.status, crate::models::market::ListingStatus::Active);
    }

    #[tokio::test]
    async fn buying_your_own_listing_is_rejected() {
        let (store, gateway, _, _, item) = setup();
        let seller = UserId::new();
        store.set_balance(seller, 500);

        gateway.grant_items(seller, item, 1, None).await.unwrap();
        let listing = gateway
            .list_item_for_sale(seller, item, 200, None)
            .await
            .unwrap();

        let err = gateway.buy_listing(seller, listing.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "buyer", .. }));
    }
}
