use crate::auth::AuthenticatedUser;
use crate::executor::{self, with_retry, TradeOrder};
use crate::models::{TradeRequest, TransactionEntry};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};

fn order_for(user_id: String, trade: TradeRequest) -> TradeOrder {
    TradeOrder {
        user_id,
        symbol: trade.symbol,
        company: trade.company,
        quantity: trade.quantity,
        price: trade.price,
    }
}

/// Buy a stock for the current user. The request body carries the symbol,
/// company name, quantity and the price per share to execute at.
#[axum::debug_handler]
pub async fn buy_stock(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<TransactionEntry>), (StatusCode, Json<String>)> {
    let order = order_for(user_id, trade);
    let (pool, order) = (&state.pool, &order);

    let entry = with_retry(state.config.trade_max_retries, move || {
        executor::buy(pool, order)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Sell a stock for the current user. Same body as [`buy_stock`].
pub async fn sell_stock(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<TransactionEntry>), (StatusCode, Json<String>)> {
    let order = order_for(user_id, trade);
    let (pool, order) = (&state.pool, &order);

    let entry = with_retry(state.config.trade_max_retries, move || {
        executor::sell(pool, order)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}
