mod balance;
mod balance_db;
mod buy_order;
mod buy_order_db;
mod catalog;
mod catalog_db;
mod inventory;
mod inventory_db;
mod market;
mod market_db;
mod trade;
mod trade_db;

pub mod mem;

pub use balance_db::BalanceRepository;
pub use buy_order_db::BuyOrderRepository;
pub use catalog_db::CatalogRepository;
pub use inventory_db::InventoryRepository;
pub use market_db::MarketRepository;
pub use trade_db::TradeRepository;

pub use balance::{AdjustOutcome, BalanceRepo};
pub use buy_order::BuyOrderRepo;
pub use catalog::CatalogRepo;
pub use inventory::InventoryRepo;
pub use market::MarketRepo;
pub use trade::TradeRepo;
