//! In-memory backend used by tests and local tooling. Implements the same
//! storage contracts as the Postgres repositories, with a single mutex
//! standing in for row locks.

use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::{
    AdjustOutcome, BalanceRepo, BuyOrderRepo, CatalogRepo, InventoryRepo, MarketRepo, TradeRepo,
};
use crate::models::catalog::CatalogItem;
use crate::models::inventory::{
    ExchangeFailure, ExchangeOutcome, ExchangeStep, ItemStack, RemoveOutcome, StackFilter,
    UniqueTag,
};
use crate::models::market::{
    BuyOrder, EnrichedListing, ListingStatus, MarketListing, OrderFilter, OrderStatus,
};
use crate::models::trade::{Trade, TradeLine, TradeSide, TradeStatus};
use crate::models::types::{ItemId, ListingId, OrderId, StackId, TradeId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    items: HashMap<ItemId, CatalogItem>,
    balances: HashMap<UserId, i64>,
    stacks: Vec<ItemStack>,
    trades: Vec<Trade>,
    listings: Vec<MarketListing>,
    orders: Vec<BuyOrder>,
}

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_catalog_item(&self, item: CatalogItem) {
        self.inner.lock().items.insert(item.id, item);
    }

    pub fn set_balance(&self, user: UserId, balance: i64) {
        self.inner.lock().balances.insert(user, balance);
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn new_stack(
    owner: UserId,
    item: ItemId,
    amount: i64,
    metadata: Option<UniqueTag>,
    sellable: bool,
    purchase_price: Option<i64>,
) -> ItemStack {
    let ts = now();
    ItemStack {
        id: StackId::new(),
        owner,
        item,
        amount,
        metadata,
        sellable,
        purchase_price,
        created_at: ts,
        updated_at: ts,
    }
}

/// Deplete `amount` untagged units of `item` from `owner`, oldest stack first.
/// Returns the taken slices as (sellable, purchase_price, qty), or
/// `Err(available)` without touching anything when the total falls short.
fn deplete(
    stacks: &mut Vec<ItemStack>,
    owner: UserId,
    item: ItemId,
    amount: i64,
    price_filter: Option<Option<i64>>,
    sellable_only: bool,
) -> Result<Vec<(bool, Option<i64>, i64)>, i64> {
    let matches = |s: &ItemStack| {
        s.owner == owner
            && s.item == item
            && s.metadata.is_none()
            && price_filter.is_none_or(|p| s.purchase_price == p)
            && (!sellable_only || s.sellable)
    };

    let available: i64 = stacks.iter().filter(|s| matches(s)).map(|s| s.amount).sum();
    if available < amount {
        return Err(available);
    }

    let mut order: Vec<usize> = (0..stacks.len()).filter(|&i| matches(&stacks[i])).collect();
    order.sort_by_key(|&i| stacks[i].created_at);

    let mut taken = Vec::new();
    let mut remaining = amount;
    for idx in order {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(stacks[idx].amount);
        taken.push((stacks[idx].sellable, stacks[idx].purchase_price, take));
        stacks[idx].amount -= take;
        stacks[idx].updated_at = now();
        remaining -= take;
    }

    stacks.retain(|s| s.amount > 0);
    Ok(taken)
}

/// Merge `amount` units into the matching fungible stack, creating it if
/// absent. Returns the index of the stack written.
fn credit(
    stacks: &mut Vec<ItemStack>,
    owner: UserId,
    item: ItemId,
    amount: i64,
    sellable: bool,
    purchase_price: Option<i64>,
) -> usize {
    let found = stacks.iter().position(|s| {
        s.owner == owner
            && s.item == item
            && s.metadata.is_none()
            && s.sellable == sellable
            && s.purchase_price == purchase_price
    });

    match found {
        Some(idx) => {
            stacks[idx].amount += amount;
            stacks[idx].updated_at = now();
            idx
        }
        None => {
            stacks.push(new_stack(owner, item, amount, None, sellable, purchase_price));
            stacks.len() - 1
        }
    }
}

fn apply_step(stacks: &mut Vec<ItemStack>, step: &ExchangeStep) -> Result<(), ExchangeFailure> {
    match *step {
        ExchangeStep::TransferUnique {
            from,
            to,
            item,
            unique_id,
        } => {
            let found = stacks.iter_mut().find(|s| {
                s.owner == from && s.item == item && s.unique_id() == Some(unique_id)
            });
            match found {
                Some(stack) => {
                    stack.owner = to;
                    stack.updated_at = now();
                    Ok(())
                }
                None => Err(ExchangeFailure::MissingUnique),
            }
        }
        ExchangeStep::MoveTagged {
            from,
            to,
            item,
            amount,
            purchase_price,
        } => {
            deplete(stacks, from, item, amount, Some(Some(purchase_price)), true)
                .map_err(|have| ExchangeFailure::Insufficient { have, need: amount })?;
            credit(stacks, to, item, amount, true, Some(purchase_price));
            Ok(())
        }
        ExchangeStep::MovePlain {
            from,
            to,
            item,
            amount,
        } => {
            let taken = deplete(stacks, from, item, amount, None, false)
                .map_err(|have| ExchangeFailure::Insufficient { have, need: amount })?;
            for (sellable, purchase_price, qty) in taken {
                credit(stacks, to, item, qty, sellable, purchase_price);
            }
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl InventoryRepo for MemStore {
    async fn query(&self, filter: &StackFilter) -> DbResult<Vec<ItemStack>> {
        let inner = self.inner.lock();

        let mut out: Vec<ItemStack> = inner
            .stacks
            .iter()
            .filter(|s| inner.items.get(&s.item).is_some_and(CatalogItem::is_live))
            .filter(|s| filter.owner.is_none_or(|o| s.owner == o))
            .filter(|s| filter.item.is_none_or(|i| s.item == i))
            .filter(|s| filter.sellable.is_none_or(|v| s.sellable == v))
            .filter(|s| filter.purchase_price.is_none_or(|p| s.purchase_price == p))
            .filter(|s| filter.unique_id.is_none_or(|u| s.unique_id() == Some(u)))
            .filter(|s| filter.fungible.is_none_or(|f| s.metadata.is_none() == f))
            .filter(|s| filter.min_amount.is_none_or(|m| s.amount >= m))
            .cloned()
            .collect();

        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    async fn prune_orphans(&self, owner: UserId) -> DbResult<u64> {
        let mut inner = self.inner.lock();
        let before = inner.stacks.len();
        let live: Vec<ItemId> = inner
            .items
            .values()
            .filter(|i| i.is_live())
            .map(|i| i.id)
            .collect();
        inner
            .stacks
            .retain(|s| s.owner != owner || live.contains(&s.item));
        Ok((before - inner.stacks.len()) as u64)
    }

    async fn merge_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack> {
        let mut inner = self.inner.lock();
        let idx = credit(&mut inner.stacks, owner, item, amount, sellable, purchase_price);
        Ok(inner.stacks[idx].clone())
    }

    async fn insert_unique(
        &self,
        owner: UserId,
        item: ItemId,
        tag: &UniqueTag,
        sellable: bool,
        purchase_price: Option<i64>,
    ) -> DbResult<ItemStack> {
        let mut inner = self.inner.lock();

        if inner
            .stacks
            .iter()
            .any(|s| s.unique_id() == Some(tag.unique_id))
        {
            return Err(DbError::UniqueViolation);
        }

        let stack = new_stack(owner, item, 1, Some(tag.clone()), sellable, purchase_price);
        inner.stacks.push(stack.clone());
        Ok(stack)
    }

    async fn remove_fungible(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
    ) -> DbResult<RemoveOutcome> {
        let mut inner = self.inner.lock();
        match deplete(&mut inner.stacks, owner, item, amount, None, false) {
            Ok(_) => Ok(RemoveOutcome::Removed),
            Err(have) => Ok(RemoveOutcome::Insufficient { have }),
        }
    }

    async fn remove_fungible_at_price(
        &self,
        owner: UserId,
        item: ItemId,
        amount: i64,
        purchase_price: Option<i64>,
        sellable_only: bool,
    ) -> DbResult<RemoveOutcome> {
        let mut inner = self.inner.lock();
        match deplete(
            &mut inner.stacks,
            owner,
            item,
            amount,
            Some(purchase_price),
            sellable_only,
        ) {
            Ok(_) => Ok(RemoveOutcome::Removed),
            Err(have) => Ok(RemoveOutcome::Insufficient { have }),
        }
    }

    async fn remove_from_stack(
        &self,
        owner: UserId,
        stack: StackId,
        amount: i64,
    ) -> DbResult<RemoveOutcome> {
        let mut inner = self.inner.lock();

        let Some(idx) = inner
            .stacks
            .iter()
            .position(|s| s.id == stack && s.owner == owner && s.metadata.is_none())
        else {
            return Ok(RemoveOutcome::Insufficient { have: 0 });
        };

        if inner.stacks[idx].amount < amount {
            return Ok(RemoveOutcome::Insufficient {
                have: inner.stacks[idx].amount,
            });
        }

        inner.stacks[idx].amount -= amount;
        inner.stacks[idx].updated_at = now();
        if inner.stacks[idx].amount == 0 {
            inner.stacks.remove(idx);
        }
        Ok(RemoveOutcome::Removed)
    }

    async fn remove_unique(&self, owner: UserId, item: ItemId, unique_id: Uuid) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let before = inner.stacks.len();
        inner
            .stacks
            .retain(|s| !(s.owner == owner && s.item == item && s.unique_id() == Some(unique_id)));
        Ok(inner.stacks.len() < before)
    }

    async fn set_amount(&self, owner: UserId, item: ItemId, amount: i64) -> DbResult<()> {
        let mut inner = self.inner.lock();
        inner
            .stacks
            .retain(|s| !(s.owner == owner && s.item == item && s.metadata.is_none()));
        if amount > 0 {
            inner
                .stacks
                .push(new_stack(owner, item, amount, None, true, None));
        }
        Ok(())
    }

    async fn update_metadata(
        &self,
        owner: UserId,
        item: ItemId,
        unique_id: Uuid,
        attrs: &serde_json::Map<String, serde_json::Value>,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock();

        let found = inner.stacks.iter_mut().find(|s| {
            s.owner == owner && s.item == item && s.unique_id() == Some(unique_id)
        });
        match found {
            Some(stack) => {
                let mut attrs = attrs.clone();
                attrs.remove("_unique_id");
                stack.metadata = Some(UniqueTag { unique_id, attrs });
                stack.updated_at = now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transfer_unique(
        &self,
        from: UserId,
        to: UserId,
        item: ItemId,
        unique_id: Uuid,
    ) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let step = ExchangeStep::TransferUnique {
            from,
            to,
            item,
            unique_id,
        };
        Ok(apply_step(&mut inner.stacks, &step).is_ok())
    }

    async fn exchange(&self, steps: &[ExchangeStep]) -> DbResult<ExchangeOutcome> {
        let mut inner = self.inner.lock();

        // Work on a copy; commit only when every step holds.
        let mut scratch = inner.stacks.clone();
        for (idx, step) in steps.iter().enumerate() {
            if let Err(reason) = apply_step(&mut scratch, step) {
                return Ok(ExchangeOutcome::Failed { step: idx, reason });
            }
        }

        inner.stacks = scratch;
        Ok(ExchangeOutcome::Applied)
    }
}

#[async_trait::async_trait]
impl CatalogRepo for MemStore {
    async fn resolve(&self, item: ItemId) -> DbResult<Option<CatalogItem>> {
        Ok(self.inner.lock().items.get(&item).cloned())
    }
}

#[async_trait::async_trait]
impl BalanceRepo for MemStore {
    async fn balance(&self, user: UserId) -> DbResult<i64> {
        self.inner
            .lock()
            .balances
            .get(&user)
            .copied()
            .ok_or(DbError::NotFound)
    }

    async fn adjust(&self, user: UserId, delta: i64) -> DbResult<AdjustOutcome> {
        let mut inner = self.inner.lock();
        let Some(balance) = inner.balances.get_mut(&user) else {
            return Err(DbError::NotFound);
        };
        if *balance + delta < 0 {
            return Ok(AdjustOutcome::Insufficient { balance: *balance });
        }
        *balance += delta;
        Ok(AdjustOutcome::Applied {
            new_balance: *balance,
        })
    }
}

#[async_trait::async_trait]
impl TradeRepo for MemStore {
    async fn find_pending_between(&self, a: UserId, b: UserId) -> DbResult<Option<Trade>> {
        let inner = self.inner.lock();
        Ok(inner
            .trades
            .iter()
            .find(|t| {
                t.status == TradeStatus::Pending
                    && ((t.from_user == a && t.to_user == b)
                        || (t.from_user == b && t.to_user == a))
            })
            .cloned())
    }

    async fn insert(&self, trade: &Trade) -> DbResult<()> {
        self.inner.lock().trades.push(trade.clone());
        Ok(())
    }

    async fn get(&self, id: TradeId) -> DbResult<Option<Trade>> {
        Ok(self.inner.lock().trades.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_user(&self, user: UserId) -> DbResult<Vec<Trade>> {
        let inner = self.inner.lock();
        let mut out: Vec<Trade> = inner
            .trades
            .iter()
            .filter(|t| t.from_user == user || t.to_user == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_lines(&self, id: TradeId, side: TradeSide, lines: &[TradeLine]) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let trade = inner
            .trades
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(DbError::NotFound)?;
        *trade.lines_mut(side) = lines.to_vec();
        trade.approved_from = false;
        trade.approved_to = false;
        trade.updated_at = now();
        Ok(())
    }

    async fn approve_side(&self, id: TradeId, side: TradeSide) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let trade = inner
            .trades
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(DbError::NotFound)?;
        if trade.status != TradeStatus::Pending {
            return Ok(false);
        }
        let flag = match side {
            TradeSide::From => &mut trade.approved_from,
            TradeSide::To => &mut trade.approved_to,
        };
        if *flag {
            return Ok(false);
        }
        *flag = true;
        trade.updated_at = now();
        Ok(trade.approved_from && trade.approved_to)
    }

    async fn reset_approvals(&self, id: TradeId) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let trade = inner
            .trades
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(DbError::NotFound)?;
        trade.approved_from = false;
        trade.approved_to = false;
        trade.updated_at = now();
        Ok(())
    }

    async fn set_status(&self, id: TradeId, status: TradeStatus) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(trade) = inner.trades.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        if trade.status != TradeStatus::Pending {
            return Ok(false);
        }
        trade.status = status;
        trade.updated_at = now();
        Ok(true)
    }
}

#[async_trait::async_trait]
impl MarketRepo for MemStore {
    async fn insert(&self, listing: &MarketListing) -> DbResult<()> {
        self.inner.lock().listings.push(listing.clone());
        Ok(())
    }

    async fn get(&self, id: ListingId) -> DbResult<Option<MarketListing>> {
        Ok(self
            .inner
            .lock()
            .listings
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn by_seller(&self, seller: UserId) -> DbResult<Vec<EnrichedListing>> {
        let inner = self.inner.lock();
        let mut rows: Vec<&MarketListing> = inner
            .listings
            .iter()
            .filter(|l| l.seller == seller)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.iter()
            .map(|l| {
                let item = inner.items.get(&l.item).ok_or(DbError::NotFound)?;
                Ok(EnrichedListing::new((*l).clone(), item))
            })
            .collect()
    }

    async fn active_for_item(&self, item: ItemId) -> DbResult<Vec<MarketListing>> {
        let inner = self.inner.lock();
        let mut out: Vec<MarketListing> = inner
            .listings
            .iter()
            .filter(|l| l.item == item && l.status == ListingStatus::Active)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.ask_price
                .cmp(&b.ask_price)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    async fn enriched(&self, limit: i64, offset: i64) -> DbResult<Vec<EnrichedListing>> {
        let inner = self.inner.lock();
        let mut rows: Vec<&MarketListing> = inner
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active)
            .filter(|l| inner.items.get(&l.item).is_some_and(CatalogItem::is_live))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|l| {
                let item = inner.items.get(&l.item).ok_or(DbError::NotFound)?;
                Ok(EnrichedListing::new((*l).clone(), item))
            })
            .collect()
    }

    async fn search(&self, term: &str, limit: i64) -> DbResult<Vec<EnrichedListing>> {
        let inner = self.inner.lock();
        let needle = term.to_lowercase();
        let mut rows: Vec<&MarketListing> = inner
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active)
            .filter(|l| {
                inner
                    .items
                    .get(&l.item)
                    .is_some_and(|i| i.is_live() && i.name.to_lowercase().contains(&needle))
            })
            .collect();
        rows.sort_by(|a, b| {
            a.ask_price
                .cmp(&b.ask_price)
                .then(a.created_at.cmp(&b.created_at))
        });
        rows.iter()
            .take(limit as usize)
            .map(|l| {
                let item = inner.items.get(&l.item).ok_or(DbError::NotFound)?;
                Ok(EnrichedListing::new((*l).clone(), item))
            })
            .collect()
    }

    async fn mark_cancelled(&self, id: ListingId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(listing) = inner
            .listings
            .iter_mut()
            .find(|l| l.id == id && l.status == ListingStatus::Active)
        else {
            return Ok(false);
        };
        listing.status = ListingStatus::Cancelled;
        listing.updated_at = now();
        Ok(true)
    }

    async fn mark_sold(&self, id: ListingId, buyer: UserId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(listing) = inner
            .listings
            .iter_mut()
            .find(|l| l.id == id && l.status == ListingStatus::Active)
        else {
            return Ok(false);
        };
        listing.status = ListingStatus::Sold;
        listing.buyer = Some(buyer);
        listing.sold_at = Some(now());
        listing.updated_at = now();
        Ok(true)
    }

    async fn reopen(&self, id: ListingId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(listing) = inner
            .listings
            .iter_mut()
            .find(|l| l.id == id && l.status == ListingStatus::Sold)
        else {
            return Ok(false);
        };
        listing.status = ListingStatus::Active;
        listing.buyer = None;
        listing.sold_at = None;
        listing.updated_at = now();
        Ok(true)
    }
}

#[async_trait::async_trait]
impl BuyOrderRepo for MemStore {
    async fn insert(&self, order: &BuyOrder) -> DbResult<()> {
        self.inner.lock().orders.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> DbResult<Option<BuyOrder>> {
        Ok(self.inner.lock().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn query(&self, filter: &OrderFilter) -> DbResult<Vec<BuyOrder>> {
        let inner = self.inner.lock();
        let mut out: Vec<BuyOrder> = inner
            .orders
            .iter()
            .filter(|o| filter.buyer.is_none_or(|b| o.buyer == b))
            .filter(|o| filter.item.is_none_or(|i| o.item == i))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| filter.min_price.is_none_or(|p| o.bid_price >= p))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn best_bid(&self, item: ItemId, ask_price: i64) -> DbResult<Option<BuyOrder>> {
        let inner = self.inner.lock();
        let mut candidates: Vec<&BuyOrder> = inner
            .orders
            .iter()
            .filter(|o| {
                o.item == item && o.status == OrderStatus::Active && o.bid_price >= ask_price
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.bid_price
                .cmp(&a.bid_price)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(candidates.first().map(|o| (*o).clone()))
    }

    async fn mark_cancelled(&self, id: OrderId, buyer: UserId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.buyer == buyer && o.status == OrderStatus::Active)
        else {
            return Ok(false);
        };
        order.status = OrderStatus::Cancelled;
        order.updated_at = now();
        Ok(true)
    }

    async fn mark_fulfilled(&self, id: OrderId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Active)
        else {
            return Ok(false);
        };
        order.status = OrderStatus::Fulfilled;
        order.fulfilled_at = Some(now());
        order.updated_at = now();
        Ok(true)
    }

    async fn reactivate(&self, id: OrderId) -> DbResult<bool> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == OrderStatus::Fulfilled)
        else {
            return Ok(false);
        };
        order.status = OrderStatus::Active;
        order.fulfilled_at = None;
        order.updated_at = now();
        Ok(true)
    }
}
