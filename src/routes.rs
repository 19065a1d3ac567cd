use crate::auth::USER_ID_HEADER;
use crate::config::Config;
use crate::db::DatabasePool;
use crate::handlers::{
    accounts::{deposit_cash, get_account, open_account},
    portfolio::{get_holding, get_holdings, get_portfolio, get_transaction, get_transaction_history},
    trading::{buy_stock, sell_stock},
};
use axum::http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

/// Shared by every request: the ledger handle and the runtime config.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: DatabasePool, config: Config) -> Self {
        AppState {
            pool,
            config: Arc::new(config),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let origin = HeaderValue::from_str(&state.config.frontend_url).unwrap_or_else(|_| {
        tracing::warn!(
            "FRONTEND_URL {:?} is not a valid origin, using the default",
            state.config.frontend_url
        );
        HeaderValue::from_static("http://localhost:5173")
    });

    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin(origin)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
        ]);

    Router::new()
        // Account routes
        .route("/account", get(get_account).post(open_account))
        .route("/deposit", post(deposit_cash))
        // Trading routes
        .route("/buy", post(buy_stock))
        .route("/sell", post(sell_stock))
        // Portfolio routes
        .route("/portfolio", get(get_portfolio))
        .route("/holdings", get(get_holdings))
        .route("/holdings/:symbol", get(get_holding))
        .route("/transactions", get(get_transaction_history))
        .route("/transactions/:id", get(get_transaction))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
}
