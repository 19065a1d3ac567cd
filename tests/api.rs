use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use stocksim_ledger::{app_router, AppState, Config, DatabasePool};
use tempfile::TempDir;
use tower::ServiceExt;

fn app() -> (TempDir, Router) {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        database_path: tmp.path().join("ledger.db").to_string_lossy().into_owned(),
        starting_cash: Decimal::from(1000),
        ..Config::default()
    };
    let pool = DatabasePool::open(&config.database_path, config.lock_timeout).unwrap();
    (tmp, app_router(AppState::new(pool, config)))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn amount(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn trade(symbol: &str, quantity: i64, price: &str) -> Value {
    json!({ "symbol": symbol, "company": "Apple Inc.", "quantity": quantity, "price": price })
}

#[tokio::test]
async fn requests_without_a_user_are_rejected() {
    let (_tmp, app) = app();
    let (status, body) = send(&app, Method::GET, "/account", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!("Unauthorized access"));
}

#[tokio::test]
async fn account_opening_and_deposit() {
    let (_tmp, app) = app();

    let (status, _) = send(&app, Method::GET, "/account", Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, "/account", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["cash_balance"]), Decimal::from(1000));

    let deposit = json!({ "amount": "250.25" });
    let (status, body) = send(&app, Method::POST, "/deposit", Some("alice"), Some(deposit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["cash_balance"]), "1250.25".parse().unwrap());

    // Opening again leaves the balance alone.
    let (_, body) = send(&app, Method::POST, "/account", Some("alice"), None).await;
    assert_eq!(amount(&body["cash_balance"]), "1250.25".parse().unwrap());
}

#[tokio::test]
async fn buy_then_sell_round_trip() {
    let (_tmp, app) = app();
    send(&app, Method::POST, "/account", Some("alice"), None).await;

    let (status, bought) = send(
        &app,
        Method::POST,
        "/buy",
        Some("alice"),
        Some(trade(" aapl ", 2, "150.50")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bought["type"], "BUY");
    assert_eq!(bought["symbol"], "AAPL");
    assert_eq!(amount(&bought["total_amount"]), "301".parse().unwrap());

    let (status, holding) = send(&app, Method::GET, "/holdings/aapl", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(holding["quantity"], 2);
    assert_eq!(holding["company"], "Apple Inc.");

    let (status, sold) = send(
        &app,
        Method::POST,
        "/sell",
        Some("alice"),
        Some(trade("AAPL", 2, "160")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sold["type"], "SELL");

    let (_, holdings) = send(&app, Method::GET, "/holdings", Some("alice"), None).await;
    assert_eq!(holdings, json!([]));

    let (_, account) = send(&app, Method::GET, "/account", Some("alice"), None).await;
    assert_eq!(amount(&account["cash_balance"]), "1019".parse().unwrap());

    let (_, history) = send(&app, Method::GET, "/transactions", Some("alice"), None).await;
    let types: Vec<_> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["SELL", "BUY"]);

    let (_, limited) = send(&app, Method::GET, "/transactions?limit=1", Some("alice"), None).await;
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let id = bought["id"].as_str().unwrap();
    let uri = format!("/transactions/{id}");
    let (status, _) = send(&app, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_trades_report_why() {
    let (_tmp, app) = app();
    send(&app, Method::POST, "/account", Some("alice"), None).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/buy",
        Some("alice"),
        Some(trade("AAPL", 10, "101")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("Insufficient funds. You have $1000.00 but need $1010.00"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/buy",
        Some("alice"),
        Some(trade("AAPL", 0, "1")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/sell",
        Some("alice"),
        Some(trade("TSLA", 1, "1")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, account) = send(&app, Method::GET, "/account", Some("alice"), None).await;
    assert_eq!(amount(&account["cash_balance"]), Decimal::from(1000));
}

#[tokio::test]
async fn portfolio_without_quotes_is_valued_at_cost() {
    let (_tmp, app) = app();
    send(&app, Method::POST, "/account", Some("alice"), None).await;
    send(&app, Method::POST, "/buy", Some("alice"), Some(trade("MSFT", 4, "25"))).await;
    send(&app, Method::POST, "/buy", Some("alice"), Some(trade("AAPL", 1, "100"))).await;

    let (status, portfolio) = send(&app, Method::GET, "/portfolio", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(portfolio["total_holdings"], 2);
    assert_eq!(amount(&portfolio["total_cost"]), Decimal::from(200));
    assert_eq!(amount(&portfolio["total_value"]), Decimal::from(200));
    assert_eq!(amount(&portfolio["total_gain_loss"]), Decimal::ZERO);
    assert_eq!(amount(&portfolio["cash_balance"]), Decimal::from(800));
    assert_eq!(amount(&portfolio["net_worth"]), Decimal::from(1000));
    assert_eq!(portfolio["holdings"][0]["symbol"], "AAPL");
    assert_eq!(portfolio["holdings"][0]["current_price"], Value::Null);
}

#[tokio::test]
async fn oversized_trade_is_a_bad_request() {
    let (_tmp, app) = app();
    send(&app, Method::POST, "/account", Some("alice"), None).await;

    let order = trade("AAPL", i64::MAX, "100000000000");
    let (status, _) = send(&app, Method::POST, "/buy", Some("alice"), Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, account) = send(&app, Method::GET, "/account", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&account["cash_balance"]), Decimal::from(1000));
}

#[tokio::test]
async fn read_views_degrade_when_the_store_fails() {
    let (tmp, app) = app();
    send(&app, Method::POST, "/account", Some("alice"), None).await;
    send(&app, Method::POST, "/buy", Some("alice"), Some(trade("AAPL", 1, "100"))).await;

    let conn = rusqlite::Connection::open(tmp.path().join("ledger.db")).unwrap();
    conn.execute_batch("DROP TABLE transactions; DROP TABLE holdings; DROP TABLE accounts;")
        .unwrap();

    let (status, holdings) = send(&app, Method::GET, "/holdings", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(holdings, json!([]));

    let (status, history) = send(&app, Method::GET, "/transactions", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));

    let (status, portfolio) = send(&app, Method::GET, "/portfolio", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(portfolio["total_holdings"], 0);
    assert_eq!(amount(&portfolio["cash_balance"]), Decimal::ZERO);
    assert_eq!(amount(&portfolio["net_worth"]), Decimal::ZERO);

    // Single-record lookups still report the failure.
    let (status, _) = send(&app, Method::GET, "/account", Some("alice"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
