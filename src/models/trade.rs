use crate::models::inventory::UniqueTag;
use crate::models::types::{ItemId, TradeId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Completed,
    Canceled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Completed => "completed",
            TradeStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "completed" => Some(TradeStatus::Completed),
            "canceled" => Some(TradeStatus::Canceled),
            _ => None,
        }
    }
}

/// Which party of a trade an actor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    From,
    To,
}

/// One proposed line: a quantity of an item, optionally pinned to a specific
/// unique instance or a cost-basis tag. Stored as jsonb on the trade row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLine {
    pub item: ItemId,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UniqueTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<i64>,
}

impl TradeLine {
    pub fn is_unique(&self) -> bool {
        self.metadata.is_some()
    }

    /// Whether `other` accumulates onto this line (same item, both untagged,
    /// same cost basis).
    pub fn merges_with(&self, other: &TradeLine) -> bool {
        self.item == other.item
            && self.metadata.is_none()
            && other.metadata.is_none()
            && self.purchase_price == other.purchase_price
    }
}

/// Two-party escrow negotiation. Leaves `Pending` only through `Completed`
/// (both approved, items swapped) or `Canceled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub from_items: Vec<TradeLine>,
    pub to_items: Vec<TradeLine>,
    pub approved_from: bool,
    pub approved_to: bool,
    pub status: TradeStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Trade {
    pub fn side_of(&self, user: UserId) -> Option<TradeSide> {
        if self.from_user == user {
            Some(TradeSide::From)
        } else if self.to_user == user {
            Some(TradeSide::To)
        } else {
            None
        }
    }

    pub fn lines(&self, side: TradeSide) -> &[TradeLine] {
        match side {
            TradeSide::From => &self.from_items,
            TradeSide::To => &self.to_items,
        }
    }

    pub fn lines_mut(&mut self, side: TradeSide) -> &mut Vec<TradeLine> {
        match side {
            TradeSide::From => &mut self.from_items,
            TradeSide::To => &mut self.to_items,
        }
    }
}
