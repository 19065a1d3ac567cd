//! Unrealized gain/loss over a user's holdings.

use crate::db::DatabasePool;
use crate::models::{normalize_symbol, Holding, HoldingValuation, PortfolioSummary};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Values `holdings` against `current_prices` (keyed by symbol).
///
/// A holding without a usable price is carried at cost and reports no
/// gain/loss. A price whose market value does not fit a `Decimal` counts as
/// unusable. When nothing is priced the aggregate gain/loss is zero rather
/// than a cost-versus-cost figure.
pub fn summarize(holdings: &[Holding], current_prices: &HashMap<String, Decimal>) -> PortfolioSummary {
    let prices: HashMap<String, Decimal> = current_prices
        .iter()
        .filter(|(_, price)| **price > Decimal::ZERO)
        .map(|(symbol, price)| (normalize_symbol(symbol), *price))
        .collect();

    let mut total_cost = Decimal::ZERO;
    let mut total_value = Decimal::ZERO;
    let mut any_priced = false;
    let mut lines = Vec::with_capacity(holdings.len());

    for holding in holdings {
        total_cost = total_cost.saturating_add(holding.total_cost);

        let valued = prices.get(&holding.symbol).and_then(|price| {
            let value = price.checked_mul(Decimal::from(holding.quantity))?;
            Some((*price, value))
        });
        let (current_price, current_value, gain_loss, gain_loss_percent) = match valued {
            Some((price, value)) => {
                any_priced = true;
                let gain_loss = value - holding.total_cost;
                total_value = total_value.saturating_add(value);
                (
                    Some(price),
                    Some(value),
                    Some(gain_loss),
                    Some(percent_of(gain_loss, holding.total_cost)),
                )
            }
            None => {
                total_value = total_value.saturating_add(holding.total_cost);
                (None, None, None, None)
            }
        };

        lines.push(HoldingValuation {
            symbol: holding.symbol.clone(),
            company: holding.company.clone(),
            quantity: holding.quantity,
            average_buy_price: holding.average_buy_price,
            total_cost: holding.total_cost,
            current_price,
            current_value,
            gain_loss,
            gain_loss_percent,
        });
    }

    let total_gain_loss = if any_priced {
        total_value - total_cost
    } else {
        Decimal::ZERO
    };

    PortfolioSummary {
        total_holdings: lines.len(),
        total_cost,
        total_value,
        total_gain_loss,
        total_gain_loss_percent: percent_of(total_gain_loss, total_cost),
        holdings: lines,
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// The user's holdings, ascending by symbol, for display.
///
/// A storage failure is logged and yields no holdings instead of an error.
pub async fn holdings_snapshot(pool: &DatabasePool, user_id: &str) -> Vec<Holding> {
    match pool.list_holdings(user_id).await {
        Ok(holdings) => holdings,
        Err(e) => {
            tracing::error!("Failed to load holdings for {}: {}", user_id, e);
            Vec::new()
        }
    }
}
