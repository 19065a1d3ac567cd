use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account represents a user's cash account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub user_id: String,
    pub cash_balance: Decimal,
}

/// One position of a user, keyed by (user_id, symbol).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Holding {
    pub user_id: String,
    pub symbol: String,
    pub company: String,
    pub quantity: i64,
    pub average_buy_price: Decimal,
    pub total_cost: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeType::Buy),
            "SELL" => Some(TradeType::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry written once per executed trade.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionEntry {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub company: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub quantity: i64,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Body of `/buy` and `/sell`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TradeRequest {
    pub symbol: String,
    #[serde(default)]
    pub company: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DepositRequest {
    pub amount: Decimal,
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// A holding joined with its current market price, if one was available.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HoldingValuation {
    pub symbol: String,
    pub company: String,
    pub quantity: i64,
    pub average_buy_price: Decimal,
    pub total_cost: Decimal,
    pub current_price: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub gain_loss: Option<Decimal>,
    pub gain_loss_percent: Option<Decimal>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PortfolioSummary {
    pub total_holdings: usize,
    pub total_cost: Decimal,
    pub total_value: Decimal,
    pub total_gain_loss: Decimal,
    pub total_gain_loss_percent: Decimal,
    pub holdings: Vec<HoldingValuation>,
}

/// What `/portfolio` renders: the valuation plus available cash.
#[derive(Serialize, Deserialize, Debug)]
pub struct PortfolioResponse {
    pub cash_balance: Decimal,
    pub net_worth: Decimal,
    #[serde(flatten)]
    pub summary: PortfolioSummary,
}

/// Uppercase and trim a ticker symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
