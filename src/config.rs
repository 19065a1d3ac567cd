use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub bind_addr: String,
    pub frontend_url: String,
    pub finnhub_api_key: Option<String>,
    pub starting_cash: Decimal,
    pub lock_timeout: Duration,
    pub trade_max_retries: u32,
    pub quote_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "db.sqlite".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            finnhub_api_key: None,
            starting_cash: Decimal::from(100_000),
            lock_timeout: Duration::from_millis(5000),
            trade_max_retries: 3,
            quote_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            frontend_url: lookup("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            finnhub_api_key: lookup("FINNHUB_API_KEY"),
            starting_cash: match lookup("STARTING_CASH") {
                Some(v) => parse::<Decimal>("STARTING_CASH", &v)?,
                None => defaults.starting_cash,
            },
            lock_timeout: match lookup("LEDGER_LOCK_TIMEOUT_MS") {
                Some(v) => Duration::from_millis(parse("LEDGER_LOCK_TIMEOUT_MS", &v)?),
                None => defaults.lock_timeout,
            },
            trade_max_retries: match lookup("TRADE_MAX_RETRIES") {
                Some(v) => parse("TRADE_MAX_RETRIES", &v)?,
                None => defaults.trade_max_retries,
            },
            quote_cache_ttl: match lookup("QUOTE_CACHE_SECS") {
                Some(v) => Duration::from_secs(parse("QUOTE_CACHE_SECS", &v)?),
                None => defaults.quote_cache_ttl,
            },
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
