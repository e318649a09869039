use crate::db::error::DbError;
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

/// Failures surfaced by the economy engine. Quantity failures are split into
/// distinct variants so callers can produce actionable messages instead of a
/// generic validation error.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Referenced trade/listing/buy-order/stack/item does not exist
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Actor is not a party of the trade
    #[error("user is not a participant in this trade")]
    NotParticipant,

    /// Actor lacks authority over the entity
    #[error("actor does not own this entity")]
    NotOwner,

    /// Operation attempted on a non-pending/non-active entity
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An inventory removal would overdraw the matching stacks
    #[error("insufficient quantity: have {have}, need {need}")]
    InsufficientQuantity { have: i64, need: i64 },

    /// Proposer no longer owns enough of an item offered in a trade
    #[error("insufficient ownership: have {have}, proposed {need}")]
    InsufficientOwnership { have: i64, need: i64 },

    /// Withdrawing more from a trade line than was proposed
    #[error("insufficient proposed amount: have {have}, requested {requested}")]
    InsufficientProposed { have: i64, requested: i64 },

    /// Balance check failed at the user/balance collaborator
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    /// Non-fungible instance already proposed in this trade
    #[error("this unique item is already in the trade")]
    DuplicateProposal,

    /// Structurally invalid create-listing request
    #[error("invalid listing: {0}")]
    InvalidListing(&'static str),

    #[error("validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Storage(#[from] DbError),
}
