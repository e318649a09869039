use crate::db::repo::{CatalogRepo, InventoryRepo, TradeRepo};
use crate::error::{AppResult, DomainError};
use crate::models::catalog::CatalogItem;
use crate::models::inventory::{ExchangeFailure, ExchangeOutcome, ExchangeStep, StackFilter};
use crate::models::trade::{Trade, TradeLine, TradeSide, TradeStatus};
use crate::models::types::{ItemId, TradeId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A trade joined with the catalog entries of every item on either side.
pub struct TradeView {
    pub trade: Trade,
    pub items: HashMap<ItemId, CatalogItem>,
}

/// Two-party trade negotiation: one pending trade per user pair, proposals
/// re-validated against live inventory, swap executed atomically on double
/// approval.
pub struct TradeService {
    trades: Arc<dyn TradeRepo>,
    stacks: Arc<dyn InventoryRepo>,
    catalog: Arc<dyn CatalogRepo>,
}

impl TradeService {
    pub fn new(
        trades: Arc<dyn TradeRepo>,
        stacks: Arc<dyn InventoryRepo>,
        catalog: Arc<dyn CatalogRepo>,
    ) -> Self {
        Self {
            trades,
            stacks,
            catalog,
        }
    }

    /// The pending trade between the pair, created empty if none exists.
    pub async fn start_or_get_pending(&self, from: UserId, to: UserId) -> AppResult<Trade> {
        if from == to {
            return Err(DomainError::Validation {
                field: "to_user",
                message: "cannot trade with yourself".into(),
            });
        }

        if let Some(trade) = self.trades.find_pending_between(from, to).await? {
            return Ok(trade);
        }

        let now = chrono::Utc::now();
        let trade = Trade {
            id: TradeId::new(),
            from_user: from,
            to_user: to,
            from_items: Vec::new(),
            to_items: Vec::new(),
            approved_from: false,
            approved_to: false,
            status: TradeStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.trades.insert(&trade).await?;
        info!(trade = %trade.id, from = %from, to = %to, "opened trade");
        Ok(trade)
    }

    pub async fn get(&self, id: TradeId) -> AppResult<Trade> {
        self.trades
            .get(id)
            .await?
            .ok_or(DomainError::NotFound("trade"))
    }

    pub async fn list_by_user(&self, user: UserId) -> AppResult<Vec<Trade>> {
        Ok(self.trades.list_by_user(user).await?)
    }

    /// The trade joined with catalog details for display. Items that have
    /// vanished from the catalog are simply absent from the map.
    pub async fn view(&self, id: TradeId) -> AppResult<TradeView> {
        let trade = self.get(id).await?;

        let mut items = HashMap::new();
        for line in trade.from_items.iter().chain(trade.to_items.iter()) {
            if items.contains_key(&line.item) {
                continue;
            }
            if let Some(item) = self.catalog.resolve(line.item).await? {
                items.insert(line.item, item);
            }
        }

        Ok(TradeView { trade, items })
    }

    /// Propose items on the caller's side. Ownership is re-validated against
    /// live inventory; any mutation clears both approvals.
    pub async fn add_item(
        &self,
        id: TradeId,
        actor: UserId,
        line: TradeLine,
    ) -> AppResult<Trade> {
        let (mut trade, side) = self.load_pending(id, actor).await?;

        if line.amount < 1 {
            return Err(DomainError::Validation {
                field: "amount",
                message: format!("must be at least 1, got {}", line.amount),
            });
        }

        let item = self
            .catalog
            .resolve(line.item)
            .await?
            .filter(CatalogItem::is_live)
            .ok_or(DomainError::NotFound("item"))?;

        if let Some(tag) = &line.metadata {
            if line.amount != 1 {
                return Err(DomainError::Validation {
                    field: "amount",
                    message: "a unique instance is always a single unit".into(),
                });
            }
            let already_proposed = trade
                .from_items
                .iter()
                .chain(trade.to_items.iter())
                .any(|l| l.metadata.as_ref().map(|m| m.unique_id) == Some(tag.unique_id));
            if already_proposed {
                return Err(DomainError::DuplicateProposal);
            }

            let owned = self
                .stacks
                .query(
                    &StackFilter::owned_by(actor)
                        .item(line.item)
                        .unique_id(tag.unique_id),
                )
                .await?;
            if owned.is_empty() {
                return Err(DomainError::InsufficientOwnership { have: 0, need: 1 });
            }

            trade.lines_mut(side).push(line);
        } else {
            let owned = self.owned_amount(actor, line.item, line.purchase_price).await?;
            let proposed: i64 = trade
                .lines(side)
                .iter()
                .filter(|l| l.merges_with(&line))
                .map(|l| l.amount)
                .sum();
            if proposed + line.amount > owned {
                return Err(DomainError::InsufficientOwnership {
                    have: owned,
                    need: proposed + line.amount,
                });
            }

            let lines = trade.lines_mut(side);
            match lines.iter_mut().find(|l| l.merges_with(&line)) {
                Some(existing) => existing.amount += line.amount,
                None => lines.push(line),
            }
        }

        self.trades
            .update_lines(id, side, trade.lines(side))
            .await?;
        info!(trade = %id, actor = %actor, item = %item.id, "proposed items");
        self.get(id).await
    }

    /// Withdraw items from the caller's side. Withdrawing a line that is not
    /// there is a no-op; over-withdrawing an existing line is an error.
    pub async fn remove_item(
        &self,
        id: TradeId,
        actor: UserId,
        item: ItemId,
        amount: i64,
        unique_id: Option<Uuid>,
        purchase_price: Option<i64>,
    ) -> AppResult<Trade> {
        let (mut trade, side) = self.load_pending(id, actor).await?;

        let lines = trade.lines_mut(side);
        let found = match unique_id {
            Some(uid) => lines
                .iter()
                .position(|l| l.metadata.as_ref().map(|m| m.unique_id) == Some(uid)),
            None => lines.iter().position(|l| {
                l.item == item && l.metadata.is_none() && l.purchase_price == purchase_price
            }),
        };

        let Some(idx) = found else {
            return Ok(trade);
        };

        if unique_id.is_none() {
            if amount > lines[idx].amount {
                return Err(DomainError::InsufficientProposed {
                    have: lines[idx].amount,
                    requested: amount,
                });
            }
            lines[idx].amount -= amount;
        } else {
            lines[idx].amount = 0;
        }
        if lines[idx].amount == 0 {
            lines.remove(idx);
        }

        self.trades
            .update_lines(id, side, trade.lines(side))
            .await?;
        info!(trade = %id, actor = %actor, item = %item, "withdrew items");
        self.get(id).await
    }

    /// Record the caller's approval. The repository write that turns on the
    /// second flag claims settlement, so concurrent approvals run the swap at
    /// most once; if the swap fails, the trade stays pending with both
    /// approvals cleared.
    pub async fn approve(&self, id: TradeId, actor: UserId) -> AppResult<Trade> {
        let (_, side) = self.load_pending(id, actor).await?;

        if !self.trades.approve_side(id, side).await? {
            return self.get(id).await;
        }

        let trade = self.get(id).await?;
        let steps = exchange_plan(&trade);
        match self.stacks.exchange(&steps).await? {
            ExchangeOutcome::Applied => {
                if !self.trades.set_status(id, TradeStatus::Completed).await? {
                    warn!(trade = %id, "trade left the pending state during settlement");
                    return Err(DomainError::InvalidState("trade is not pending"));
                }
                info!(trade = %id, steps = steps.len(), "trade completed");
                self.get(id).await
            }
            ExchangeOutcome::Failed { step, reason } => {
                self.trades.reset_approvals(id).await?;
                warn!(trade = %id, step, ?reason, "exchange failed, approvals reset");
                Err(match reason {
                    ExchangeFailure::MissingUnique => {
                        DomainError::InsufficientOwnership { have: 0, need: 1 }
                    }
                    ExchangeFailure::Insufficient { have, need } => {
                        DomainError::InsufficientOwnership { have, need }
                    }
                })
            }
        }
    }

    /// Either party may cancel while pending. Inventories are untouched.
    pub async fn cancel(&self, id: TradeId, actor: UserId) -> AppResult<Trade> {
        let trade = self.get(id).await?;
        if trade.side_of(actor).is_none() {
            return Err(DomainError::NotParticipant);
        }

        if !self.trades.set_status(id, TradeStatus::Canceled).await? {
            return Err(DomainError::InvalidState("trade is not pending"));
        }
        info!(trade = %id, actor = %actor, "trade canceled");
        self.get(id).await
    }

    async fn load_pending(&self, id: TradeId, actor: UserId) -> AppResult<(Trade, TradeSide)> {
        let trade = self.get(id).await?;
        let side = trade.side_of(actor).ok_or(DomainError::NotParticipant)?;
        if trade.status != TradeStatus::Pending {
            return Err(DomainError::InvalidState("trade is not pending"));
        }
        Ok((trade, side))
    }

    /// Units of `item` the user could commit for a fungible line: any untagged
    /// stack when the line carries no cost basis, else sellable stacks at
    /// that tag.
    async fn owned_amount(
        &self,
        owner: UserId,
        item: ItemId,
        purchase_price: Option<i64>,
    ) -> AppResult<i64> {
        let mut filter = StackFilter::owned_by(owner).item(item).fungible(true);
        if let Some(price) = purchase_price {
            filter = filter.sellable(true).purchase_price(Some(price));
        }
        let stacks = self.stacks.query(&filter).await?;
        Ok(stacks.iter().map(|s| s.amount).sum())
    }
}

/// Flatten both sides of a trade into one atomic step list. Unique instances
/// transfer ownership, cost-basis-tagged lines keep their tag and arrive
/// sellable, plain lines move with per-stack provenance.
fn exchange_plan(trade: &Trade) -> Vec<ExchangeStep> {
    let mut steps = Vec::new();
    for (lines, from, to) in [
        (&trade.from_items, trade.from_user, trade.to_user),
        (&trade.to_items, trade.to_user, trade.from_user),
    ] {
        for line in lines {
            steps.push(match (&line.metadata, line.purchase_price) {
                (Some(tag), _) => ExchangeStep::TransferUnique {
                    from,
                    to,
                    item: line.item,
                    unique_id: tag.unique_id,
                },
                (None, Some(price)) => ExchangeStep::MoveTagged {
                    from,
                    to,
                    item: line.item,
                    amount: line.amount,
                    purchase_price: price,
                },
                (None, None) => ExchangeStep::MovePlain {
                    from,
                    to,
                    item: line.item,
                    amount: line.amount,
                },
            });
        }
    }
    steps
}
