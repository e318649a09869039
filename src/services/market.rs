use crate::config::Config;
use crate::db::repo::{
    AdjustOutcome, BalanceRepo, BuyOrderRepo, CatalogRepo, InventoryRepo, MarketRepo,
};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::CatalogItem;
use crate::models::inventory::{ItemStack, RemoveOutcome, StackFilter};
use crate::models::market::{
    BuyOrder, EnrichedListing, ListingStatus, MarketListing, OrderFilter, OrderStatus,
};
use crate::models::types::{ItemId, ListingId, OrderId, UserId};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Debit the buyer the full price, credit the seller the configured payout
/// share. The debit is conditional; an insolvent buyer changes nothing.
pub(crate) async fn settle_purchase(
    balances: &Arc<dyn BalanceRepo>,
    config: &Config,
    buyer: UserId,
    seller: UserId,
    price: i64,
) -> AppResult<()> {
    match balances.adjust(buyer, -price).await? {
        AdjustOutcome::Applied { .. } => {}
        AdjustOutcome::Insufficient { balance } => {
            return Err(DomainError::InsufficientFunds {
                balance,
                required: price,
            });
        }
    }
    balances.adjust(seller, config.seller_payout(price)).await?;
    Ok(())
}

/// Reverse a settlement after a lost race. The seller claw-back is best
/// effort; a seller who already spent the payout keeps the shortfall logged.
pub(crate) async fn refund_purchase(
    balances: &Arc<dyn BalanceRepo>,
    config: &Config,
    buyer: UserId,
    seller: UserId,
    price: i64,
) -> AppResult<()> {
    balances.adjust(buyer, price).await?;
    let payout = config.seller_payout(price);
    if let AdjustOutcome::Insufficient { balance } = balances.adjust(seller, -payout).await? {
        warn!(seller = %seller, payout, balance, "could not claw back seller payout");
    }
    Ok(())
}

/// The marketplace: sell listings escrow exactly one unit, buy orders are
/// standing bids, and a new listing is matched synchronously against the best
/// compatible bid.
pub struct MarketService {
    listings: Arc<dyn MarketRepo>,
    orders: Arc<dyn BuyOrderRepo>,
    stacks: Arc<dyn InventoryRepo>,
    catalog: Arc<dyn CatalogRepo>,
    balances: Arc<dyn BalanceRepo>,
    config: Config,
}

impl MarketService {
    pub fn new(
        listings: Arc<dyn MarketRepo>,
        orders: Arc<dyn BuyOrderRepo>,
        stacks: Arc<dyn InventoryRepo>,
        catalog: Arc<dyn CatalogRepo>,
        balances: Arc<dyn BalanceRepo>,
        config: Config,
    ) -> Self {
        Self {
            listings,
            orders,
            stacks,
            catalog,
            balances,
            config,
        }
    }

    /// List one unit for sale. The unit leaves the seller's inventory now and
    /// comes back only through `cancel_listing`. A unique instance is selected
    /// by its id and may be listed regardless of its sellable flag; otherwise
    /// the oldest sellable stack is drawn from, preferring cost-basis-tagged
    /// stacks over plain ones.
    pub async fn create_listing(
        &self,
        seller: UserId,
        item: ItemId,
        ask_price: i64,
        unique_id: Option<Uuid>,
    ) -> AppResult<MarketListing> {
        if ask_price < 1 {
            return Err(DomainError::InvalidListing("ask price must be positive"));
        }
        self.catalog
            .resolve(item)
            .await?
            .filter(CatalogItem::is_live)
            .ok_or(DomainError::NotFound("item"))?;

        let source = self.take_unit(seller, item, unique_id).await?;

        let now = chrono::Utc::now();
        let listing = MarketListing {
            id: ListingId::new(),
            seller,
            item,
            ask_price,
            purchase_price: source.purchase_price,
            status: ListingStatus::Active,
            metadata: source.metadata,
            sellable: source.sellable,
            buyer: None,
            sold_at: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.listings.insert(&listing).await {
            warn!(listing = %listing.id, error = %e, "listing insert failed, returning the unit");
            self.restore_unit(&listing).await?;
            return Err(e.into());
        }
        info!(listing = %listing.id, seller = %seller, item = %item, ask_price, "listing created");

        self.auto_fill(listing).await
    }

    /// Pull the listed unit out of the seller's stacks, capturing its metadata
    /// and cost basis for the listing row.
    async fn take_unit(
        &self,
        seller: UserId,
        item: ItemId,
        unique_id: Option<Uuid>,
    ) -> AppResult<ItemStack> {
        if let Some(uid) = unique_id {
            let found = self
                .stacks
                .query(&StackFilter::default().item(item).unique_id(uid))
                .await?;
            let stack = found
                .into_iter()
                .next()
                .ok_or(DomainError::NotFound("unique item instance"))?;
            if stack.owner != seller {
                return Err(DomainError::NotOwner);
            }
            if !self.stacks.remove_unique(seller, item, uid).await? {
                return Err(DomainError::NotFound("unique item instance"));
            }
            return Ok(stack);
        }

        let candidates = self
            .stacks
            .query(&StackFilter::owned_by(seller).item(item).fungible(true))
            .await?;
        let stack = candidates
            .iter()
            .filter(|s| s.sellable)
            .find(|s| s.purchase_price.is_some())
            .or_else(|| candidates.iter().find(|s| s.sellable))
            .cloned();
        let Some(stack) = stack else {
            // Unsellable stock is a precondition failure, not a shortfall.
            if candidates.is_empty() {
                return Err(DomainError::InsufficientQuantity { have: 0, need: 1 });
            }
            return Err(DomainError::InvalidListing("item is not sellable"));
        };

        match self.stacks.remove_from_stack(seller, stack.id, 1).await? {
            RemoveOutcome::Removed => Ok(stack),
            RemoveOutcome::Insufficient { have } => {
                Err(DomainError::InsufficientQuantity { have, need: 1 })
            }
        }
    }

    /// One-shot synchronous match of a fresh listing against the best
    /// compatible bid. The bidder is settled before the order is consumed, so
    /// an insolvent bidder leaves both the listing and the order active.
    async fn auto_fill(&self, listing: MarketListing) -> AppResult<MarketListing> {
        let Some(order) = self
            .orders
            .best_bid(listing.item, listing.ask_price)
            .await?
        else {
            return Ok(listing);
        };

        match settle_purchase(
            &self.balances,
            &self.config,
            order.buyer,
            listing.seller,
            listing.ask_price,
        )
        .await
        {
            Ok(()) => {}
            Err(DomainError::InsufficientFunds { balance, required }) => {
                warn!(
                    order = %order.id,
                    bidder = %order.buyer,
                    balance,
                    required,
                    "matched bidder is insolvent, listing stays active"
                );
                return Ok(listing);
            }
            Err(e) => return Err(e),
        }

        if !self.orders.mark_fulfilled(order.id).await? {
            refund_purchase(
                &self.balances,
                &self.config,
                order.buyer,
                listing.seller,
                listing.ask_price,
            )
            .await?;
            return self.get(listing.id).await;
        }
        if !self.listings.mark_sold(listing.id, order.buyer).await? {
            // Lost to a concurrent buyer; the bidder keeps the standing order.
            self.orders.reactivate(order.id).await?;
            refund_purchase(
                &self.balances,
                &self.config,
                order.buyer,
                listing.seller,
                listing.ask_price,
            )
            .await?;
            return self.get(listing.id).await;
        }

        if let Err(e) = self.deliver_unit(&listing, order.buyer).await {
            warn!(listing = %listing.id, order = %order.id, error = %e, "delivery failed, unwinding the fill");
            self.listings.reopen(listing.id).await?;
            self.orders.reactivate(order.id).await?;
            refund_purchase(
                &self.balances,
                &self.config,
                order.buyer,
                listing.seller,
                listing.ask_price,
            )
            .await?;
            return Err(e);
        }
        info!(
            listing = %listing.id,
            order = %order.id,
            buyer = %order.buyer,
            price = listing.ask_price,
            "listing auto-filled from buy order"
        );
        self.get(listing.id).await
    }

    /// Deliver the sold unit to its buyer: metadata and cost basis travel
    /// with it, and a purchased unit is always resellable.
    async fn deliver_unit(&self, listing: &MarketListing, buyer: UserId) -> AppResult<()> {
        match &listing.metadata {
            Some(tag) => {
                self.stacks
                    .insert_unique(buyer, listing.item, tag, true, listing.purchase_price)
                    .await?;
            }
            None => {
                self.stacks
                    .merge_fungible(buyer, listing.item, 1, true, listing.purchase_price)
                    .await?;
            }
        }
        Ok(())
    }

    /// Put an unsold listing's unit back in the seller's inventory exactly as
    /// it was taken: metadata, cost basis and sellability all verbatim.
    async fn restore_unit(&self, listing: &MarketListing) -> AppResult<()> {
        match &listing.metadata {
            Some(tag) => {
                self.stacks
                    .insert_unique(
                        listing.seller,
                        listing.item,
                        tag,
                        listing.sellable,
                        listing.purchase_price,
                    )
                    .await?;
            }
            None => {
                self.stacks
                    .merge_fungible(
                        listing.seller,
                        listing.item,
                        1,
                        listing.sellable,
                        listing.purchase_price,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Hand the listed unit to `buyer` and mark the listing sold. Moves no
    /// currency; settlement is the caller's job.
    pub async fn buy_listing(&self, id: ListingId, buyer: UserId) -> AppResult<MarketListing> {
        let listing = self.get(id).await?;
        if listing.status != ListingStatus::Active {
            return Err(DomainError::InvalidState("listing is not active"));
        }

        // Guarded transition; a concurrent buyer loses here, not later.
        if !self.listings.mark_sold(id, buyer).await? {
            return Err(DomainError::InvalidState("listing is not active"));
        }

        if let Err(e) = self.deliver_unit(&listing, buyer).await {
            warn!(listing = %id, error = %e, "delivery failed, reopening the listing");
            self.listings.reopen(id).await?;
            return Err(e);
        }
        info!(listing = %id, buyer = %buyer, "listing sold");
        self.get(id).await
    }

    /// Seller-only cancel: the escrowed unit returns with its original
    /// metadata and cost basis.
    pub async fn cancel_listing(&self, id: ListingId, seller: UserId) -> AppResult<MarketListing> {
        let listing = self.get(id).await?;
        if listing.seller != seller {
            return Err(DomainError::NotOwner);
        }
        if !self.listings.mark_cancelled(id).await? {
            return Err(DomainError::InvalidState("listing is not active"));
        }

        self.restore_unit(&listing).await?;
        info!(listing = %id, seller = %seller, "listing cancelled");
        self.get(id).await
    }

    pub async fn create_buy_order(
        &self,
        buyer: UserId,
        item: ItemId,
        bid_price: i64,
    ) -> AppResult<BuyOrder> {
        if bid_price < 1 {
            return Err(DomainError::Validation {
                field: "bid_price",
                message: format!("must be at least 1, got {bid_price}"),
            });
        }
        self.catalog
            .resolve(item)
            .await?
            .filter(CatalogItem::is_live)
            .ok_or(DomainError::NotFound("item"))?;

        let now = chrono::Utc::now();
        let order = BuyOrder {
            id: OrderId::new(),
            buyer,
            item,
            bid_price,
            status: OrderStatus::Active,
            fulfilled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(&order).await?;
        info!(order = %order.id, buyer = %buyer, item = %item, bid_price, "buy order placed");
        Ok(order)
    }

    pub async fn cancel_buy_order(&self, id: OrderId, buyer: UserId) -> AppResult<BuyOrder> {
        if self.orders.mark_cancelled(id, buyer).await? {
            info!(order = %id, buyer = %buyer, "buy order cancelled");
            return self.order(id).await;
        }

        let order = self.order(id).await?;
        if order.buyer != buyer {
            return Err(DomainError::NotOwner);
        }
        Err(DomainError::InvalidState("buy order is not active"))
    }

    pub async fn get(&self, id: ListingId) -> AppResult<MarketListing> {
        self.listings
            .get(id)
            .await?
            .ok_or(DomainError::NotFound("listing"))
    }

    pub async fn order(&self, id: OrderId) -> AppResult<BuyOrder> {
        self.orders
            .get(id)
            .await?
            .ok_or(DomainError::NotFound("buy order"))
    }

    pub async fn listings_by_seller(&self, seller: UserId) -> AppResult<Vec<EnrichedListing>> {
        Ok(self.listings.by_seller(seller).await?)
    }

    /// Active listings for an item, cheapest and oldest first.
    pub async fn active_for_item(&self, item: ItemId) -> AppResult<Vec<MarketListing>> {
        Ok(self.listings.active_for_item(item).await?)
    }

    pub async fn browse(&self, limit: i64, offset: i64) -> AppResult<Vec<EnrichedListing>> {
        Ok(self.listings.enriched(limit, offset).await?)
    }

    pub async fn search(&self, term: &str, limit: i64) -> AppResult<Vec<EnrichedListing>> {
        Ok(self.listings.search(term, limit).await?)
    }

    pub async fn orders(&self, filter: &OrderFilter) -> AppResult<Vec<BuyOrder>> {
        Ok(self.orders.query(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::error::DbError;
    use crate::db::repo::mem::MemStore;
    use crate::services::InventoryService;
    use serde_json::{Map, Value};

    fn catalog_item(id: ItemId, name: &str) -> CatalogItem {
        CatalogItem {
            id,
            name: name.into(),
            description: String::new(),
            icon_hash: None,
            base_price: 100,
            owner: None,
            sellable_default: true,
            deleted: false,
        }
    }

    struct Fixture {
        store: MemStore,
        market: MarketService,
        inventory: InventoryService,
        seller: UserId,
        buyer: UserId,
        gem: ItemId,
    }

    fn setup() -> Fixture {
        let store = MemStore::new();
        let gem = ItemId::new();
        store.insert_catalog_item(catalog_item(gem, "Gem"));

        let seller = UserId::new();
        let buyer = UserId::new();
        store.set_balance(seller, 0);
        store.set_balance(buyer, 1_000);

        Fixture {
            market: MarketService::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Config::default(),
            ),
            inventory: InventoryService::new(Arc::new(store.clone())),
            store,
            seller,
            buyer,
            gem,
        }
    }

    #[tokio::test]
    async fn listing_escrows_exactly_one_unit() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 3, None, true, Some(40))
            .await
            .unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.purchase_price, Some(40));
        assert_eq!(f.inventory.fungible_amount(f.seller, f.gem).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cancel_inverts_create() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, Some(40))
            .await
            .unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        assert_eq!(f.inventory.fungible_amount(f.seller, f.gem).await.unwrap(), 0);

        let cancelled = f.market.cancel_listing(listing.id, f.seller).await.unwrap();
        assert_eq!(cancelled.status, ListingStatus::Cancelled);

        let stacks = f
            .inventory
            .query(&StackFilter::owned_by(f.seller))
            .await
            .unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].amount, 1);
        assert_eq!(stacks[0].purchase_price, Some(40));
        assert!(stacks[0].sellable);
    }

    #[tokio::test]
    async fn only_the_seller_may_cancel() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        let err = f.market.cancel_listing(listing.id, f.buyer).await.unwrap_err();
        assert!(matches!(err, DomainError::NotOwner));
    }

    #[tokio::test]
    async fn unique_listing_round_trips_its_metadata() {
        let f = setup();
        let mut template = Map::new();
        template.insert("rarity".into(), Value::String("legendary".into()));
        let stacks = f
            .inventory
            .add_stack(f.seller, f.gem, 1, Some(&template), true, Some(500))
            .await
            .unwrap();
        let uid = stacks[0].unique_id().unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 900, Some(uid))
            .await
            .unwrap();
        assert_eq!(listing.metadata.as_ref().unwrap().unique_id, uid);
        assert_eq!(listing.metadata.as_ref().unwrap().rarity(), Some("legendary"));

        let sold = f.market.buy_listing(listing.id, f.buyer).await.unwrap();
        assert_eq!(sold.status, ListingStatus::Sold);

        let got = f
            .inventory
            .query(&StackFilter::owned_by(f.buyer))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].unique_id(), Some(uid));
        assert_eq!(got[0].purchase_price, Some(500));
    }

    #[tokio::test]
    async fn unsellable_units_cannot_be_listed() {
        let f = setup();

        // No stock at all is a quantity problem.
        let err = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientQuantity { have: 0, need: 1 }
        ));

        // Unsellable stock fails the listing precondition instead.
        f.inventory
            .add_stack(f.seller, f.gem, 2, None, false, None)
            .await
            .unwrap();
        let err = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidListing(_)));
    }

    #[tokio::test]
    async fn unsellable_unique_is_listable_and_cancel_keeps_its_flag() {
        let f = setup();
        let mut template = Map::new();
        template.insert("soulbound".into(), Value::Bool(true));
        let stacks = f
            .inventory
            .add_stack(f.seller, f.gem, 1, Some(&template), false, None)
            .await
            .unwrap();
        let uid = stacks[0].unique_id().unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 250, Some(uid))
            .await
            .unwrap();
        assert!(!listing.sellable);

        f.market.cancel_listing(listing.id, f.seller).await.unwrap();

        let got = f
            .inventory
            .query(&StackFilter::owned_by(f.seller))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].unique_id(), Some(uid));
        assert!(!got[0].sellable);
    }

    #[tokio::test]
    async fn lost_fill_race_reactivates_the_order_and_refunds() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        let order = f.market.create_buy_order(f.buyer, f.gem, 120).await.unwrap();

        // A direct buyer takes the listing between the match and the fill.
        let rival = UserId::new();
        assert!(f.store.mark_sold(listing.id, rival).await.unwrap());

        let after = f.market.auto_fill(listing).await.unwrap();
        assert_eq!(after.buyer, Some(rival));

        // The bidder keeps the standing order and every coin.
        let order = f.market.order(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(f.store.balance(f.buyer).await.unwrap(), 1_000);
        assert_eq!(f.store.balance(f.seller).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_delivery_reopens_the_listing() {
        let f = setup();
        let mut template = Map::new();
        template.insert("rarity".into(), Value::String("rare".into()));
        let stacks = f
            .inventory
            .add_stack(f.seller, f.gem, 1, Some(&template), true, None)
            .await
            .unwrap();
        let uid = stacks[0].unique_id().unwrap();
        let tag = stacks[0].metadata.clone().unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, Some(uid))
            .await
            .unwrap();

        // A colliding instance makes the hand-over impossible.
        let squatter = UserId::new();
        f.store
            .insert_unique(squatter, f.gem, &tag, true, None)
            .await
            .unwrap();

        let err = f.market.buy_listing(listing.id, f.buyer).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage(DbError::UniqueViolation)));

        // The sale unwound: the unit stays escrowed and the listing is live.
        let listing = f.market.get(listing.id).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Active);
        assert!(listing.buyer.is_none());
        assert!(
            f.inventory
                .query(&StackFilter::owned_by(f.buyer))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn auto_fill_prefers_higher_bid_then_older() {
        let f = setup();
        let rival = UserId::new();
        f.store.set_balance(rival, 1_000);
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();

        // Older low bid first, newer high bid second.
        let low = f.market.create_buy_order(f.buyer, f.gem, 100).await.unwrap();
        let high = f.market.create_buy_order(rival, f.gem, 120).await.unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        assert_eq!(listing.status, ListingStatus::Sold);
        assert_eq!(listing.buyer, Some(rival));

        // The winner pays the ask, not the bid.
        assert_eq!(f.store.balance(rival).await.unwrap(), 900);
        assert_eq!(f.store.balance(f.seller).await.unwrap(), 75);

        let high = f.market.order(high.id).await.unwrap();
        assert_eq!(high.status, OrderStatus::Fulfilled);
        let low = f.market.order(low.id).await.unwrap();
        assert_eq!(low.status, OrderStatus::Active);

        assert_eq!(f.inventory.fungible_amount(rival, f.gem).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn auto_fill_skips_underpriced_bids() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();
        f.market.create_buy_order(f.buyer, f.gem, 80).await.unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        assert_eq!(listing.status, ListingStatus::Active);
    }

    #[tokio::test]
    async fn insolvent_bidder_leaves_listing_and_order_active() {
        let f = setup();
        let broke = UserId::new();
        f.store.set_balance(broke, 10);
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();

        let order = f.market.create_buy_order(broke, f.gem, 150).await.unwrap();
        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();

        assert_eq!(listing.status, ListingStatus::Active);
        let order = f.market.order(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(f.store.balance(broke).await.unwrap(), 10);
        assert_eq!(f.store.balance(f.seller).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sold_listing_cannot_be_bought_again() {
        let f = setup();
        f.inventory
            .add_stack(f.seller, f.gem, 1, None, true, None)
            .await
            .unwrap();

        let listing = f
            .market
            .create_listing(f.seller, f.gem, 100, None)
            .await
            .unwrap();
        f.market.buy_listing(listing.id, f.buyer).await.unwrap();

        let err = f.market.buy_listing(listing.id, f.buyer).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancel_buy_order_is_buyer_scoped() {
        let f = setup();
        let order = f.market.create_buy_order(f.buyer, f.gem, 100).await.unwrap();

        let err = f
            .market
            .cancel_buy_order(order.id, f.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotOwner));

        let done = f.market.cancel_buy_order(order.id, f.buyer).await.unwrap();
        assert_eq!(done.status, OrderStatus::Cancelled);
    }
}
