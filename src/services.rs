mod gateway;
mod inventory;
mod market;
mod trade;

pub use gateway::EconomyGateway;
pub use inventory::InventoryService;
pub use market::MarketService;
pub use trade::{TradeService, TradeView};
