pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod services;

// Convenient re-exports (so call sites can do `bazaar::Registry`, etc.)
pub use config::Config;
pub use error::{AppResult, DomainError};
pub use registry::{Registry, Repos, Services};
