use crate::auth::AuthenticatedUser;
use crate::executor;
use crate::models::{Account, DepositRequest};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};

/// Gets the current user's account.
pub async fn get_account(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<(StatusCode, Json<Account>), (StatusCode, Json<String>)> {
    let account = state.pool.get_account(&user_id).await?;
    Ok((StatusCode::OK, Json(account)))
}

/// Opens an account with the configured starting cash. Calling it again
/// returns the existing account untouched.
pub async fn open_account(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<(StatusCode, Json<Account>), (StatusCode, Json<String>)> {
    let account = state
        .pool
        .open_account(&user_id, state.config.starting_cash)
        .await?;
    Ok((StatusCode::OK, Json(account)))
}

pub async fn deposit_cash(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(deposit): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Account>), (StatusCode, Json<String>)> {
    let account = executor::deposit(&state.pool, &user_id, deposit.amount).await?;
    Ok((StatusCode::OK, Json(account)))
}
