use crate::models::types::{ItemId, StackId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata bag of a non-fungible instance. The `_unique_id` field is
/// mandatory once an instance is tagged; everything else is opaque payload
/// carried verbatim. Serializes to the flat JSON object stored in the
/// `metadata` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueTag {
    #[serde(rename = "_unique_id")]
    pub unique_id: Uuid,

    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl UniqueTag {
    /// Stamp a fresh unique id onto a metadata template. A `_unique_id` key in
    /// the template is discarded so identical templates still yield globally
    /// unique instances.
    pub fn stamp(template: &Map<String, Value>) -> Self {
        let mut attrs = template.clone();
        attrs.remove("_unique_id");
        Self {
            unique_id: Uuid::new_v4(),
            attrs,
        }
    }

    pub fn rarity(&self) -> Option<&str> {
        self.attrs.get("rarity").and_then(Value::as_str)
    }

    pub fn custom_url_link(&self) -> Option<&str> {
        self.attrs.get("custom_url_link").and_then(Value::as_str)
    }
}

/// One row of inventory: N identical units of an item owned by a user, or
/// exactly one non-fungible unit when `metadata` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: StackId,
    pub owner: UserId,
    pub item: ItemId,

    /// Always >= 1 in storage; a stack depleted to 0 is deleted.
    pub amount: i64,

    pub metadata: Option<UniqueTag>,

    /// Whether the units may be resold on the marketplace.
    pub sellable: bool,

    /// Cost basis: the price the units were acquired at. Segregates stacks
    /// bought at different prices and determines resale payout downstream.
    pub purchase_price: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ItemStack {
    pub fn is_unique(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn unique_id(&self) -> Option<Uuid> {
        self.metadata.as_ref().map(|m| m.unique_id)
    }

    /// Fungible stacks coalesce by (owner, item, sellable, purchase_price);
    /// tagged stacks never merge.
    pub fn merges_with(&self, other: &ItemStack) -> bool {
        self.metadata.is_none()
            && other.metadata.is_none()
            && self.owner == other.owner
            && self.item == other.item
            && self.sellable == other.sellable
            && self.purchase_price == other.purchase_price
    }
}

/// Filters for inventory queries. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct StackFilter {
    pub owner: Option<UserId>,
    pub item: Option<ItemId>,
    pub sellable: Option<bool>,
    /// Outer `Some` enables the filter; the inner value is the cost-basis tag
    /// to match (`None` matches untagged stacks).
    pub purchase_price: Option<Option<i64>>,
    pub unique_id: Option<Uuid>,
    /// `Some(true)` restricts to no-metadata stacks, `Some(false)` to tagged ones.
    pub fungible: Option<bool>,
    pub min_amount: Option<i64>,
}

impl StackFilter {
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Default::default()
        }
    }

    pub fn item(mut self, item: ItemId) -> Self {
        self.item = Some(item);
        self
    }

    pub fn sellable(mut self, sellable: bool) -> Self {
        self.sellable = Some(sellable);
        self
    }

    pub fn purchase_price(mut self, price: Option<i64>) -> Self {
        self.purchase_price = Some(price);
        self
    }

    pub fn unique_id(mut self, unique_id: Uuid) -> Self {
        self.unique_id = Some(unique_id);
        self
    }

    pub fn fungible(mut self, fungible: bool) -> Self {
        self.fungible = Some(fungible);
        self
    }

    pub fn min_amount(mut self, min: i64) -> Self {
        self.min_amount = Some(min);
        self
    }
}

/// Result of an atomic removal attempt. Shortfalls are reported instead of
/// partially applied; the storage layer never commits a partial removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Insufficient { have: i64 },
}

/// One step of a trade exchange. Steps carry the direction explicitly so a
/// full two-sided swap is a single flat list executed as one atomic unit.
#[derive(Debug, Clone)]
pub enum ExchangeStep {
    /// Reassign ownership of a singleton tagged stack.
    TransferUnique {
        from: UserId,
        to: UserId,
        item: ItemId,
        unique_id: Uuid,
    },
    /// Move a cost-basis-tagged quantity drawn from sellable stacks only;
    /// the tag survives and the received units are sellable.
    MoveTagged {
        from: UserId,
        to: UserId,
        item: ItemId,
        amount: i64,
        purchase_price: i64,
    },
    /// Move an untagged quantity oldest-stack-first; each depleted source
    /// stack's sellability and cost basis are preserved on the receiving side.
    MovePlain {
        from: UserId,
        to: UserId,
        item: ItemId,
        amount: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeFailure {
    /// The tagged instance is no longer owned by the sender.
    MissingUnique,
    /// The sender's matching stacks no longer cover the amount.
    Insufficient { have: i64, need: i64 },
}

/// Outcome of an exchange attempt. `Failed` means nothing was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Applied,
    Failed { step: usize, reason: ExchangeFailure },
}
