pub mod catalog;
pub mod inventory;
pub mod market;
pub mod trade;
pub mod types;
