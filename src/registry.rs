use crate::config::Config;
use crate::db::Db;
use crate::db::repo::mem::MemStore;
use crate::db::repo::{
    BalanceRepo, BalanceRepository, BuyOrderRepo, BuyOrderRepository, CatalogRepo,
    CatalogRepository, InventoryRepo, InventoryRepository, MarketRepo, MarketRepository,
    TradeRepo, TradeRepository,
};
use crate::services::{EconomyGateway, InventoryService, MarketService, TradeService};
use std::sync::Arc;

/// Storage handles, one per aggregate. Everything is behind a trait object so
/// the whole engine can run against Postgres or the in-memory backend.
#[derive(Clone)]
pub struct Repos {
    pub inventory: Arc<dyn InventoryRepo>,
    pub trades: Arc<dyn TradeRepo>,
    pub listings: Arc<dyn MarketRepo>,
    pub orders: Arc<dyn BuyOrderRepo>,
    pub catalog: Arc<dyn CatalogRepo>,
    pub balances: Arc<dyn BalanceRepo>,
}

#[derive(Clone)]
pub struct Services {
    pub inventory: Arc<InventoryService>,
    pub trades: Arc<TradeService>,
    pub market: Arc<MarketService>,
    pub gateway: Arc<EconomyGateway>,
}

/// Wiring of the whole engine. Construct once at startup and hand out clones.
#[derive(Clone)]
pub struct Registry {
    pub repos: Repos,
    pub services: Services,
    pub config: Config,
}

impl Registry {
    /// Postgres-backed wiring.
    pub fn new(db: Arc<Db>, config: Config) -> Self {
        let repos = Repos {
            inventory: Arc::new(InventoryRepository::new(db.clone())),
            trades: Arc::new(TradeRepository::new(db.clone())),
            listings: Arc::new(MarketRepository::new(db.clone())),
            orders: Arc::new(BuyOrderRepository::new(db.clone())),
            catalog: Arc::new(CatalogRepository::new(db.clone())),
            balances: Arc::new(BalanceRepository::new(db)),
        };
        Self::from_repos(repos, config)
    }

    /// Wiring over the in-memory backend. Returns the store alongside so the
    /// caller can seed catalog items and balances.
    pub fn in_memory(config: Config) -> (Self, MemStore) {
        let store = MemStore::new();
        let repos = Repos {
            inventory: Arc::new(store.clone()),
            trades: Arc::new(store.clone()),
            listings: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            catalog: Arc::new(store.clone()),
            balances: Arc::new(store.clone()),
        };
        (Self::from_repos(repos, config), store)
    }

    pub fn from_repos(repos: Repos, config: Config) -> Self {
        let inventory = Arc::new(InventoryService::new(repos.inventory.clone()));
        let trades = Arc::new(TradeService::new(
            repos.trades.clone(),
            repos.inventory.clone(),
            repos.catalog.clone(),
        ));
        let market = Arc::new(MarketService::new(
            repos.listings.clone(),
            repos.orders.clone(),
            repos.inventory.clone(),
            repos.catalog.clone(),
            repos.balances.clone(),
            config.clone(),
        ));
        let gateway = Arc::new(EconomyGateway::new(
            inventory.clone(),
            trades.clone(),
            market.clone(),
            repos.catalog.clone(),
            repos.balances.clone(),
            config.clone(),
        ));

        Self {
            services: Services {
                inventory,
                trades,
                market,
                gateway,
            },
            repos,
            config,
        }
    }
}
