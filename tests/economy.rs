//! End-to-end scenarios over the in-memory backend: items flow through
//! grants, trades, listings and buy orders while quantities and balances
//! stay consistent.

use bazaar::db::repo::BalanceRepo;
use bazaar::db::repo::mem::MemStore;
use bazaar::models::catalog::CatalogItem;
use bazaar::models::inventory::StackFilter;
use bazaar::models::market::{ListingStatus, OrderStatus};
use bazaar::models::trade::{TradeLine, TradeStatus};
use bazaar::models::types::{ItemId, UserId};
use bazaar::{Config, DomainError, Registry};

fn catalog_item(id: ItemId, name: &str, base_price: i64, creator: Option<UserId>) -> CatalogItem {
    CatalogItem {
        id,
        name: name.into(),
        description: format!("{name} from the test catalog"),
        icon_hash: None,
        base_price,
        owner: creator,
        sellable_default: true,
        deleted: false,
    }
}

struct World {
    registry: Registry,
    store: MemStore,
    alice: UserId,
    bob: UserId,
    gem: ItemId,
}

fn world() -> World {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (registry, store) = Registry::in_memory(Config::default());
    let gem = ItemId::new();
    store.insert_catalog_item(catalog_item(gem, "Gem", 100, None));

    let alice = UserId::new();
    let bob = UserId::new();
    store.set_balance(alice, 1_000);
    store.set_balance(bob, 1_000);

    World {
        registry,
        store,
        alice,
        bob,
        gem,
    }
}

async fn total_units(w: &World, item: ItemId) -> i64 {
    let mut total = 0;
    for user in [w.alice, w.bob] {
        let stacks = w
            .registry
            .services
            .inventory
            .query(&StackFilter::owned_by(user).item(item))
            .await
            .unwrap();
        total += stacks.iter().map(|s| s.amount).sum::<i64>();
    }
    total
}

#[tokio::test]
async fn quantity_is_conserved_through_trade_and_market() {
    let w = world();
    let gateway = &w.registry.services.gateway;

    gateway.grant_items(w.alice, w.gem, 10, None).await.unwrap();
    assert_eq!(total_units(&w, w.gem).await, 10);

    // Trade 4 units to Bob.
    let trade = gateway.open_trade(w.alice, w.bob).await.unwrap();
    gateway
        .propose_trade_item(
            trade.id,
            w.alice,
            TradeLine {
                item: w.gem,
                amount: 4,
                metadata: None,
                purchase_price: None,
            },
        )
        .await
        .unwrap();
    gateway.approve_trade(trade.id, w.alice).await.unwrap();
    let done = gateway.approve_trade(trade.id, w.bob).await.unwrap();
    assert_eq!(done.status, TradeStatus::Completed);
    assert_eq!(total_units(&w, w.gem).await, 10);

    // List one of Bob's units; the escrowed unit is out of both inventories
    // until it sells.
    let listing = gateway
        .list_item_for_sale(w.bob, w.gem, 150, None)
        .await
        .unwrap();
    assert_eq!(total_units(&w, w.gem).await, 9);

    gateway.buy_listing(w.alice, listing.id).await.unwrap();
    assert_eq!(total_units(&w, w.gem).await, 10);
}

#[tokio::test]
async fn unique_instance_survives_trade_and_resale_intact() {
    let w = world();
    let gateway = &w.registry.services.gateway;

    let mut template = serde_json::Map::new();
    template.insert("rarity".into(), serde_json::Value::String("mythic".into()));
    let granted = gateway
        .grant_items(w.alice, w.gem, 1, Some(&template))
        .await
        .unwrap();
    let uid = granted[0].unique_id().unwrap();
    let tag = granted[0].metadata.clone().unwrap();

    // Alice trades the instance to Bob.
    let trade = gateway.open_trade(w.alice, w.bob).await.unwrap();
    gateway
        .propose_trade_item(
            trade.id,
            w.alice,
            TradeLine {
                item: w.gem,
                amount: 1,
                metadata: Some(tag),
                purchase_price: None,
            },
        )
        .await
        .unwrap();
    gateway.approve_trade(trade.id, w.alice).await.unwrap();
    gateway.approve_trade(trade.id, w.bob).await.unwrap();

    // Bob resells it on the market; Alice buys it back.
    let listing = gateway
        .list_item_for_sale(w.bob, w.gem, 300, Some(uid))
        .await
        .unwrap();
    gateway.buy_listing(w.alice, listing.id).await.unwrap();

    let stacks = gateway.inventory_of(w.alice).await.unwrap();
    assert_eq!(stacks.len(), 1);
    assert_eq!(stacks[0].unique_id(), Some(uid));
    assert_eq!(stacks[0].metadata.as_ref().unwrap().rarity(), Some("mythic"));
    assert!(gateway.inventory_of(w.bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_with_no_match_sells_to_the_first_buyer() {
    let w = world();
    let gateway = &w.registry.services.gateway;

    gateway.grant_items(w.alice, w.gem, 1, None).await.unwrap();
    let listing = gateway
        .list_item_for_sale(w.alice, w.gem, 120, None)
        .await
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Active);

    let sold = gateway.buy_listing(w.bob, listing.id).await.unwrap();
    assert_eq!(sold.status, ListingStatus::Sold);
    assert_eq!(sold.buyer, Some(w.bob));

    // Buyer paid the full ask, seller got the payout share.
    assert_eq!(w.store.balance(w.bob).await.unwrap(), 880);
    assert_eq!(w.store.balance(w.alice).await.unwrap(), 1_090);
}

#[tokio::test]
async fn best_bid_wins_the_auto_fill() {
    let w = world();
    let gateway = &w.registry.services.gateway;
    let carol = UserId::new();
    w.store.set_balance(carol, 1_000);

    gateway.grant_items(w.alice, w.gem, 1, None).await.unwrap();

    // Bob bids first but lower; Carol bids later but higher.
    let losing = gateway.place_buy_order(w.bob, w.gem, 100).await.unwrap();
    let winning = gateway.place_buy_order(carol, w.gem, 120).await.unwrap();

    let listing = gateway
        .list_item_for_sale(w.alice, w.gem, 100, None)
        .await
        .unwrap();
    assert_eq!(listing.status, ListingStatus::Sold);
    assert_eq!(listing.buyer, Some(carol));

    let orders = gateway.buy_orders_of(carol).await.unwrap();
    assert_eq!(orders[0].id, winning.id);
    assert_eq!(orders[0].status, OrderStatus::Fulfilled);

    let orders = gateway.buy_orders_of(w.bob).await.unwrap();
    assert_eq!(orders[0].id, losing.id);
    assert_eq!(orders[0].status, OrderStatus::Active);

    // Carol pays the ask price, not her bid.
    assert_eq!(w.store.balance(carol).await.unwrap(), 900);
}

#[tokio::test]
async fn equal_bids_go_to_the_older_order() {
    let w = world();
    let gateway = &w.registry.services.gateway;
    let carol = UserId::new();
    w.store.set_balance(carol, 1_000);

    gateway.grant_items(w.alice, w.gem, 1, None).await.unwrap();
    gateway.place_buy_order(w.bob, w.gem, 110).await.unwrap();
    gateway.place_buy_order(carol, w.gem, 110).await.unwrap();

    let listing = gateway
        .list_item_for_sale(w.alice, w.gem, 100, None)
        .await
        .unwrap();
    assert_eq!(listing.buyer, Some(w.bob));
}

#[tokio::test]
async fn browse_and_search_rank_listings() {
    let w = world();
    let gateway = &w.registry.services.gateway;
    let market = &w.registry.services.market;

    let ore = ItemId::new();
    w.store
        .insert_catalog_item(catalog_item(ore, "Ore", 10, None));

    gateway.grant_items(w.alice, w.gem, 2, None).await.unwrap();
    gateway.grant_items(w.alice, ore, 1, None).await.unwrap();

    let pricey = gateway
        .list_item_for_sale(w.alice, w.gem, 500, None)
        .await
        .unwrap();
    let cheap = gateway
        .list_item_for_sale(w.alice, w.gem, 200, None)
        .await
        .unwrap();
    gateway
        .list_item_for_sale(w.alice, ore, 50, None)
        .await
        .unwrap();

    let hits = market.search("gem", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].listing.id, cheap.id);
    assert_eq!(hits[1].listing.id, pricey.id);

    let per_item = market.active_for_item(w.gem).await.unwrap();
    assert_eq!(per_item[0].id, cheap.id);

    let page = market.browse(2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn trade_failure_rolls_back_and_keeps_negotiating() {
    let w = world();
    let gateway = &w.registry.services.gateway;

    gateway.grant_items(w.alice, w.gem, 5, None).await.unwrap();
    let trade = gateway.open_trade(w.alice, w.bob).await.unwrap();
    gateway
        .propose_trade_item(
            trade.id,
            w.alice,
            TradeLine {
                item: w.gem,
                amount: 5,
                metadata: None,
                purchase_price: None,
            },
        )
        .await
        .unwrap();

    // Alice lists 2 of the 5 before approvals land.
    gateway
        .list_item_for_sale(w.alice, w.gem, 100, None)
        .await
        .unwrap();
    gateway
        .list_item_for_sale(w.alice, w.gem, 100, None)
        .await
        .unwrap();

    gateway.approve_trade(trade.id, w.alice).await.unwrap();
    let err = gateway.approve_trade(trade.id, w.bob).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::InsufficientOwnership { have: 3, need: 5 }
    ));

    let after = w.registry.services.trades.get(trade.id).await.unwrap();
    assert_eq!(after.status, TradeStatus::Pending);
    assert!(!after.approved_from && !after.approved_to);

    // Nothing moved; the proposal can be fixed and completed.
    assert!(gateway.inventory_of(w.bob).await.unwrap().is_empty());
    gateway
        .withdraw_trade_item(trade.id, w.alice, w.gem, 2, None, None)
        .await
        .unwrap();
    gateway.approve_trade(trade.id, w.alice).await.unwrap();
    let done = gateway.approve_trade(trade.id, w.bob).await.unwrap();
    assert_eq!(done.status, TradeStatus::Completed);

    let bobs = gateway.inventory_of(w.bob).await.unwrap();
    assert_eq!(bobs.iter().map(|s| s.amount).sum::<i64>(), 3);
}

#[tokio::test]
async fn soft_deleting_an_item_hides_it_everywhere() {
    let w = world();
    let gateway = &w.registry.services.gateway;

    gateway.grant_items(w.alice, w.gem, 3, None).await.unwrap();

    let mut gone = catalog_item(w.gem, "Gem", 100, None);
    gone.deleted = true;
    w.store.insert_catalog_item(gone);

    assert!(gateway.inventory_of(w.alice).await.unwrap().is_empty());
    let err = gateway.grant_items(w.alice, w.gem, 1, None).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound("item")));
}
