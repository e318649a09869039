use crate::models::catalog::CatalogItem;
use crate::models::inventory::UniqueTag;
use crate::models::types::{ItemId, ListingId, OrderId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
    Cancelled,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ListingStatus::Active),
            "sold" => Some(ListingStatus::Sold),
            "cancelled" => Some(ListingStatus::Cancelled),
            _ => None,
        }
    }
}

/// A sell order: exactly one unit removed from the seller's inventory at
/// creation, returned on cancel, handed to the buyer on sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListing {
    pub id: ListingId,
    pub seller: UserId,
    pub item: ItemId,
    pub ask_price: i64,

    /// Cost basis carried over from the source stack.
    pub purchase_price: Option<i64>,

    pub status: ListingStatus,

    /// Present when the listed unit is a unique instance.
    pub metadata: Option<UniqueTag>,

    /// Sellability of the source stack, restored verbatim on cancel.
    pub sellable: bool,

    pub buyer: Option<UserId>,
    pub sold_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Listing joined with live catalog details, for browse/search responses.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedListing {
    #[serde(flatten)]
    pub listing: MarketListing,
    pub item_name: String,
    pub item_description: String,
    pub item_icon_hash: Option<String>,
}

impl EnrichedListing {
    pub fn new(listing: MarketListing, item: &CatalogItem) -> Self {
        Self {
            listing,
            item_name: item.name.clone(),
            item_description: item.description.clone(),
            item_icon_hash: item.icon_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(OrderStatus::Active),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// A standing bid for one unit of an item. Active orders for the same item
/// are ranked by price descending, then by age (oldest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyOrder {
    pub id: OrderId,
    pub buyer: UserId,
    pub item: ItemId,
    pub bid_price: i64,
    pub status: OrderStatus,
    pub fulfilled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Filters for buy-order queries. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub buyer: Option<UserId>,
    pub item: Option<ItemId>,
    pub status: Option<OrderStatus>,
    pub min_price: Option<i64>,
}
