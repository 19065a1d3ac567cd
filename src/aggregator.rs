//! Average-cost bookkeeping for a single holding.
//!
//! Pure functions, no I/O. The executor reads the current holding, runs one of
//! these, and writes the result back inside the same atomic scope.

use crate::error::LedgerError;
use crate::models::Holding;
use rust_decimal::Decimal;

/// The numeric part of a holding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub quantity: i64,
    pub average_buy_price: Decimal,
    pub total_cost: Decimal,
}

impl From<&Holding> for Position {
    fn from(h: &Holding) -> Self {
        Position {
            quantity: h.quantity,
            average_buy_price: h.average_buy_price,
            total_cost: h.total_cost,
        }
    }
}

/// Adds `quantity` shares bought at `price` to an existing position (or none).
///
/// The average price is the cost-weighted mean over every buy; sells never
/// move it.
pub fn apply_buy(
    existing: Option<Position>,
    quantity: i64,
    price: Decimal,
) -> Result<Position, LedgerError> {
    if quantity <= 0 || price <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(
            "Quantity and price must be greater than 0".to_string(),
        ));
    }
    let cost = Decimal::from(quantity)
        .checked_mul(price)
        .ok_or_else(LedgerError::too_large)?;

    Ok(match existing {
        None => Position {
            quantity,
            average_buy_price: price,
            total_cost: cost,
        },
        Some(p) => {
            let new_quantity = p
                .quantity
                .checked_add(quantity)
                .ok_or_else(LedgerError::too_large)?;
            let new_total_cost = p
                .total_cost
                .checked_add(cost)
                .ok_or_else(LedgerError::too_large)?;
            let average_buy_price = new_total_cost
                .checked_div(Decimal::from(new_quantity))
                .ok_or_else(LedgerError::too_large)?;
            Position {
                quantity: new_quantity,
                average_buy_price,
                total_cost: new_total_cost,
            }
        }
    })
}

/// Removes `quantity` shares from a position.
///
/// Returns `None` when the position is fully liquidated; the caller must
/// delete the record. Otherwise total cost is re-derived from the unchanged
/// average price so repeated partial sells do not accumulate drift.
pub fn apply_sell(existing: Position, quantity: i64) -> Result<Option<Position>, LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidInput(
            "Quantity and price must be greater than 0".to_string(),
        ));
    }
    if existing.quantity < quantity {
        return Err(LedgerError::InsufficientShares {
            available: existing.quantity,
        });
    }

    let new_quantity = existing.quantity - quantity;
    if new_quantity == 0 {
        return Ok(None);
    }
    let total_cost = existing
        .average_buy_price
        .checked_mul(Decimal::from(new_quantity))
        .ok_or_else(LedgerError::too_large)?;
    Ok(Some(Position {
        quantity: new_quantity,
        average_buy_price: existing.average_buy_price,
        total_cost,
    }))
}
