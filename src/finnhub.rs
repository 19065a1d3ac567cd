use futures_util::future::join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Response structure for Finnhub API
#[derive(Deserialize, Clone, Debug)]
pub struct FinnhubQuote {
    pub c: f64,  // Current price
    pub d: f64,  // Day change
    pub dp: f64, // Day change percentage
    pub pc: f64, // Previous close
}

impl FinnhubQuote {
    /// The current price as a ledger decimal, if it is a usable positive number.
    pub fn current_price(&self) -> Option<Decimal> {
        Decimal::from_f64(self.c)
            .map(|p| p.round_dp(4))
            .filter(|p| *p > Decimal::ZERO)
    }
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Failed to reach Finnhub: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch stock price: HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid stock price returned for {0}")]
    InvalidPrice(String),
}

// Make the client and cache static and reusable
lazy_static::lazy_static! {
    static ref CLIENT: reqwest::Client = reqwest::Client::new();
    static ref CACHE: Mutex<HashMap<String, (FinnhubQuote, Instant)>> = Mutex::new(HashMap::new());
}

pub async fn fetch_stock_price(
    api_key: &str,
    symbol: &str,
    cache_ttl: Duration,
) -> Result<FinnhubQuote, QuoteError> {
    let now = Instant::now();

    if let Some((quote, timestamp)) = CACHE.lock().await.get(symbol) {
        if now.duration_since(*timestamp) < cache_ttl {
            return Ok(quote.clone());
        }
    }

    let response = CLIENT
        .get("https://finnhub.io/api/v1/quote")
        .query(&[("symbol", symbol), ("token", api_key)])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(QuoteError::Status(response.status()));
    }

    let quote: FinnhubQuote = response.json().await?;
    if quote.current_price().is_none() {
        return Err(QuoteError::InvalidPrice(symbol.to_string()));
    }

    CACHE
        .lock()
        .await
        .insert(symbol.to_string(), (quote.clone(), now));

    Ok(quote)
}

/// Current prices for `symbols`, fetched concurrently.
///
/// Symbols whose quote could not be fetched are left out, which the valuator
/// treats as "no live price". Without an API key nothing is fetched.
pub async fn fetch_current_prices(
    api_key: Option<&str>,
    symbols: &[String],
    cache_ttl: Duration,
) -> HashMap<String, Decimal> {
    let Some(api_key) = api_key else {
        tracing::debug!("No FINNHUB_API_KEY configured, valuing holdings at cost");
        return HashMap::new();
    };

    let quotes = join_all(symbols.iter().map(|symbol| async move {
        let result = fetch_stock_price(api_key, symbol, cache_ttl).await;
        (symbol, result)
    }))
    .await;

    let mut prices = HashMap::new();
    for (symbol, result) in quotes {
        match result {
            Ok(quote) => {
                if let Some(price) = quote.current_price() {
                    prices.insert(symbol.clone(), price);
                }
            }
            Err(e) => tracing::warn!("Error fetching price for {}: {}", symbol, e),
        }
    }
    prices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(c: f64) -> FinnhubQuote {
        FinnhubQuote {
            c,
            d: 0.0,
            dp: 0.0,
            pc: c,
        }
    }

    #[test]
    fn current_price_is_rounded_to_four_places() {
        assert_eq!(quote(189.123456).current_price(), Some(dec!(189.1235)));
        assert_eq!(quote(42.5).current_price(), Some(dec!(42.5)));
    }

    #[test]
    fn zero_or_negative_quotes_are_unusable() {
        assert_eq!(quote(0.0).current_price(), None);
        assert_eq!(quote(-3.0).current_price(), None);
        assert_eq!(quote(f64::NAN).current_price(), None);
    }

    #[tokio::test]
    async fn missing_api_key_yields_no_prices() {
        let prices =
            fetch_current_prices(None, &["AAPL".to_string()], Duration::from_secs(1)).await;
        assert!(prices.is_empty());
    }
}
