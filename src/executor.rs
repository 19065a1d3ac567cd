//! Buy, sell and deposit against the ledger.
//!
//! Each operation runs in a single atomic scope: balance, holding and the
//! transaction entry change together or not at all. Prices come from the
//! caller; nothing in here reaches the network.

use crate::aggregator::{apply_buy, apply_sell, Position};
use crate::db::{DatabasePool, LedgerScope};
use crate::error::LedgerError;
use crate::models::{normalize_symbol, Account, Holding, TradeType, TransactionEntry};
use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;

/// One buy or sell as submitted by a caller.
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub user_id: String,
    pub symbol: String,
    pub company: String,
    pub quantity: i64,
    pub price: Decimal,
}

impl TradeOrder {
    fn validate(&self) -> Result<(), LedgerError> {
        if self.quantity <= 0 || self.price <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "Quantity and price must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn normalized(&self) -> TradeOrder {
        TradeOrder {
            user_id: self.user_id.clone(),
            symbol: normalize_symbol(&self.symbol),
            company: self.company.trim().to_string(),
            quantity: self.quantity,
            price: self.price,
        }
    }

    fn total_amount(&self) -> Result<Decimal, LedgerError> {
        Decimal::from(self.quantity)
            .checked_mul(self.price)
            .ok_or_else(LedgerError::too_large)
    }

    fn entry(&self, trade_type: TradeType, total_amount: Decimal) -> TransactionEntry {
        TransactionEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            symbol: self.symbol.clone(),
            company: self.company.clone(),
            trade_type,
            quantity: self.quantity,
            price: self.price,
            total_amount,
            executed_at: Utc::now(),
        }
    }

    fn holding(&self, position: Position) -> Holding {
        Holding {
            user_id: self.user_id.clone(),
            symbol: self.symbol.clone(),
            company: self.company.clone(),
            quantity: position.quantity,
            average_buy_price: position.average_buy_price,
            total_cost: position.total_cost,
        }
    }
}

/// Buys `order.quantity` shares at `order.price`, paying from the cash balance.
pub async fn buy(pool: &DatabasePool, order: &TradeOrder) -> Result<TransactionEntry, LedgerError> {
    order.validate()?;
    let order = order.normalized();
    let total_cost = order.total_amount()?;

    let scoped = order.clone();
    let result = pool
        .atomic(move |scope| buy_in_scope(scope, &scoped, total_cost))
        .await;
    log_outcome(&order, TradeType::Buy, &result);
    result
}

fn buy_in_scope(
    scope: &mut LedgerScope<'_>,
    order: &TradeOrder,
    total_cost: Decimal,
) -> Result<TransactionEntry, LedgerError> {
    let balance = scope
        .get_balance(&order.user_id)?
        .ok_or_else(|| LedgerError::UserNotFound(order.user_id.clone()))?;

    if balance < total_cost {
        return Err(LedgerError::InsufficientFunds {
            available: balance,
            required: total_cost,
        });
    }
    scope.set_balance(&order.user_id, balance - total_cost)?;

    let entry = order.entry(TradeType::Buy, total_cost);
    scope.append_transaction(&entry)?;

    let existing = scope
        .get_holding(&order.user_id, &order.symbol)?
        .map(|h| Position::from(&h));
    let position = apply_buy(existing, order.quantity, order.price)?;
    scope.upsert_holding(&order.holding(position))?;

    Ok(entry)
}

/// Sells `order.quantity` shares at `order.price`, crediting the cash balance.
pub async fn sell(pool: &DatabasePool, order: &TradeOrder) -> Result<TransactionEntry, LedgerError> {
    order.validate()?;
    let order = order.normalized();
    let proceeds = order.total_amount()?;

    let scoped = order.clone();
    let result = pool
        .atomic(move |scope| sell_in_scope(scope, &scoped, proceeds))
        .await;
    log_outcome(&order, TradeType::Sell, &result);
    result
}

fn sell_in_scope(
    scope: &mut LedgerScope<'_>,
    order: &TradeOrder,
    proceeds: Decimal,
) -> Result<TransactionEntry, LedgerError> {
    let holding = scope
        .get_holding(&order.user_id, &order.symbol)?
        .ok_or_else(|| LedgerError::NoSuchHolding(order.symbol.clone()))?;
    if holding.quantity < order.quantity {
        return Err(LedgerError::InsufficientShares {
            available: holding.quantity,
        });
    }

    let entry = order.entry(TradeType::Sell, proceeds);
    scope.append_transaction(&entry)?;

    let balance = scope
        .get_balance(&order.user_id)?
        .ok_or_else(|| LedgerError::UserNotFound(order.user_id.clone()))?;
    let credited = balance
        .checked_add(proceeds)
        .ok_or_else(LedgerError::too_large)?;
    scope.set_balance(&order.user_id, credited)?;

    match apply_sell(Position::from(&holding), order.quantity)? {
        None => scope.delete_holding(&order.user_id, &order.symbol)?,
        Some(position) => {
            // The sell path leaves the stored company name alone.
            let mut updated = order.holding(position);
            updated.company = holding.company;
            scope.upsert_holding(&updated)?;
        }
    }

    Ok(entry)
}

/// Adds `amount` to the user's cash balance.
pub async fn deposit(
    pool: &DatabasePool,
    user_id: &str,
    amount: Decimal,
) -> Result<Account, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(
            "Deposit amount must be greater than 0".to_string(),
        ));
    }

    let owner = user_id.to_string();
    let cash_balance = pool
        .atomic(move |scope| {
            let balance = scope
                .get_balance(&owner)?
                .ok_or_else(|| LedgerError::UserNotFound(owner.clone()))?;
            let new_balance = balance
                .checked_add(amount)
                .ok_or_else(LedgerError::too_large)?;
            scope.set_balance(&owner, new_balance)?;
            Ok(new_balance)
        })
        .await?;

    tracing::info!("Deposited {} for {}", amount, user_id);
    Ok(Account {
        user_id: user_id.to_string(),
        cash_balance,
    })
}

/// Re-runs `op` from scratch while it fails with a retryable conflict.
///
/// Every failed attempt rolled back completely, so a retry re-reads the
/// current balance and holding.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!("Attempt {}/{} hit a conflict: {}", attempt, max_attempts, e);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn log_outcome(
    order: &TradeOrder,
    trade_type: TradeType,
    result: &Result<TransactionEntry, LedgerError>,
) {
    match result {
        Ok(entry) => tracing::info!(
            "{} {} x {} @ {} for {} (transaction {})",
            trade_type,
            order.symbol,
            order.quantity,
            order.price,
            order.user_id,
            entry.id
        ),
        Err(LedgerError::StoreUnavailable(e)) => {
            tracing::error!("{} {} for {} failed: {}", trade_type, order.symbol, order.user_id, e)
        }
        Err(e) => tracing::warn!(
            "{} {} for {} rejected: {}",
            trade_type,
            order.symbol,
            order.user_id,
            e
        ),
    }
}
