use axum::{http::StatusCode, Json};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Everything a ledger operation can fail with.
///
/// Any of these aborts the atomic scope it happened in, so no partial write
/// is ever visible to other requests.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Account {0} not found")]
    UserNotFound(String),

    // Cents shown toward the shortfall, so a sub-cent gap never reads as none.
    #[error(
        "Insufficient funds. You have ${:.2} but need ${:.2}",
        .available.round_dp_with_strategy(2, RoundingStrategy::ToZero),
        .required.round_dp_with_strategy(2, RoundingStrategy::AwayFromZero)
    )]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("You do not own any shares of {0}")]
    NoSuchHolding(String),

    #[error("Insufficient shares. You only have {available} shares")]
    InsufficientShares { available: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Ledger is busy, retry the request: {0}")]
    ConflictRetryable(String),

    #[error("Ledger storage unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// An amount or quantity whose arithmetic left the representable range.
    pub(crate) fn too_large() -> Self {
        LedgerError::InvalidInput("Amount is too large".to_string())
    }

    /// Whether re-running the whole operation from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConflictRetryable(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::InvalidInput(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::InsufficientShares { .. } => StatusCode::BAD_REQUEST,
            LedgerError::UserNotFound(_)
            | LedgerError::NoSuchHolding(_)
            | LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::ConflictRetryable(_) => StatusCode::CONFLICT,
            LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                LedgerError::ConflictRetryable(err.to_string())
            }
            _ => LedgerError::StoreUnavailable(err.to_string()),
        }
    }
}

/// Handlers answer with `(StatusCode, Json<String>)` on failure.
impl From<LedgerError> for (StatusCode, Json<String>) {
    fn from(err: LedgerError) -> Self {
        (err.status_code(), Json(err.to_string()))
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_funds_message_includes_both_amounts() {
        let err = LedgerError::InsufficientFunds {
            available: dec!(50),
            required: dec!(120.5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds. You have $50.00 but need $120.50"
        );
    }

    #[test]
    fn sub_cent_shortfall_is_still_visible() {
        let err = LedgerError::InsufficientFunds {
            available: dec!(100),
            required: dec!(100.001),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds. You have $100.00 but need $100.01"
        );

        let err = LedgerError::InsufficientFunds {
            available: dec!(99.999),
            required: dec!(100),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds. You have $99.99 but need $100.00"
        );
    }

    #[test]
    fn insufficient_shares_message_includes_available_quantity() {
        let err = LedgerError::InsufficientShares { available: 3 };
        assert_eq!(err.to_string(), "Insufficient shares. You only have 3 shares");
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(LedgerError::ConflictRetryable("busy".into()).is_retryable());
        assert!(!LedgerError::StoreUnavailable("io".into()).is_retryable());
        assert!(!LedgerError::InsufficientShares { available: 0 }.is_retryable());
    }

    #[test]
    fn busy_sqlite_errors_map_to_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(LedgerError::from(busy).is_retryable());

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(
            LedgerError::from(other),
            LedgerError::StoreUnavailable(_)
        ));
    }
}
