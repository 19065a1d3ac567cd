use crate::auth::AuthenticatedUser;
use crate::error::LedgerError;
use crate::finnhub::fetch_current_prices;
use crate::models::{Holding, HistoryQuery, PortfolioResponse, TransactionEntry};
use crate::routes::AppState;
use crate::valuator;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;

const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Holdings valued at current market prices, plus cash and net worth.
///
/// Prices are fetched before touching the ledger; a symbol without a quote is
/// carried at cost.
pub async fn get_portfolio(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<(StatusCode, Json<PortfolioResponse>), (StatusCode, Json<String>)> {
    let cash_balance = match state.pool.get_account(&user_id).await {
        Ok(account) => account.cash_balance,
        Err(e @ LedgerError::UserNotFound(_)) => return Err(e.into()),
        Err(e) => {
            tracing::error!("Failed to load cash balance for {}: {}", user_id, e);
            Decimal::ZERO
        }
    };

    let holdings = valuator::holdings_snapshot(&state.pool, &user_id).await;
    let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
    let prices = fetch_current_prices(
        state.config.finnhub_api_key.as_deref(),
        &symbols,
        state.config.quote_cache_ttl,
    )
    .await;

    let summary = valuator::summarize(&holdings, &prices);
    Ok((
        StatusCode::OK,
        Json(PortfolioResponse {
            cash_balance,
            net_worth: cash_balance.saturating_add(summary.total_value),
            summary,
        }),
    ))
}

pub async fn get_holdings(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> (StatusCode, Json<Vec<Holding>>) {
    let holdings = valuator::holdings_snapshot(&state.pool, &user_id).await;
    (StatusCode::OK, Json(holdings))
}

pub async fn get_holding(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(symbol): Path<String>,
) -> Result<(StatusCode, Json<Holding>), (StatusCode, Json<String>)> {
    let holding = state.pool.get_holding(&user_id, &symbol).await?;
    Ok((StatusCode::OK, Json(holding)))
}

/// Transaction history, newest first.
pub async fn get_transaction_history(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<Vec<TransactionEntry>>) {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let transactions = match state.pool.list_transactions(&user_id, Some(limit)).await {
        Ok(transactions) => transactions,
        Err(e) => {
            tracing::error!("Failed to load transactions for {}: {}", user_id, e);
            Vec::new()
        }
    };
    (StatusCode::OK, Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TransactionEntry>), (StatusCode, Json<String>)> {
    let transaction = state.pool.get_transaction(&user_id, &id).await?;
    Ok((StatusCode::OK, Json(transaction)))
}
