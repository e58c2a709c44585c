use axum::Router;
use axum::http::{Method, StatusCode};
use domain::portfolio::{Portfolio, TradeDirection};
use domain::valuation::PortfolioValuation;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::error::ErrorBody;
use crate::api::test_support::{
    get, json_request, raw_json_request, read_json, test_handle, with_state,
};

const EPS: f64 = 1e-9;

async fn setup_with_user(user: &str) -> (Router, TempDir) {
    let (handle, dir) = test_handle().await;
    handle.sim().register(user, "pw").await.unwrap();
    (with_state(super::router(handle.clone()), &handle), dir)
}

async fn trade(app: &Router, user: &str, body: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/portfolio/{user}/trade"),
            &body,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_portfolio() {
    let (app, _dir) = setup_with_user("alice").await;

    let response = app.clone().oneshot(get("/portfolio/alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let portfolio: Portfolio = read_json(response).await;
    assert_eq!(portfolio.user_id, "alice");

    let missing = app.oneshot(get("/portfolio/nobody")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let error: ErrorBody = read_json(missing).await;
    assert_eq!(error.message, "Portfolio not found");
}

#[tokio::test]
async fn test_buy_then_sell() {
    let (app, _dir) = setup_with_user("alice").await;

    let bought = trade(
        &app,
        "alice",
        json!({ "ticker": "SAP.DE", "shares": 10, "tradeType": "buy" }),
    )
    .await;
    assert_eq!(bought.status(), StatusCode::OK);
    let portfolio: Portfolio = read_json(bought).await;
    assert!((portfolio.cash - 8_200.0).abs() < EPS);
    assert_eq!(portfolio.shares_of("SAP.DE"), 10);

    let sold = trade(
        &app,
        "alice",
        json!({ "ticker": "SAP.DE", "shares": 10, "tradeType": "sell" }),
    )
    .await;
    assert_eq!(sold.status(), StatusCode::OK);
    let portfolio: Portfolio = read_json(sold).await;
    assert!((portfolio.cash - 10_000.0).abs() < EPS);
    assert!(portfolio.holding("SAP.DE").is_none());
    assert_eq!(portfolio.history.len(), 2);
    assert_eq!(portfolio.history[1].direction, TradeDirection::Sell);
}

#[tokio::test]
async fn test_rejected_trades() {
    let (app, _dir) = setup_with_user("alice").await;

    let cases = [
        (
            json!({ "ticker": "SAP.DE", "shares": 0, "tradeType": "buy" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({ "ticker": "", "shares": 1, "tradeType": "buy" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({ "ticker": "SAP.DE", "shares": 1, "tradeType": "hold" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({ "ticker": "SAP.DE", "shares": 1_000_000, "tradeType": "buy" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({ "ticker": "SAP.DE", "shares": 1, "tradeType": "sell" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({ "ticker": "NOPE", "shares": 1, "tradeType": "buy" }),
            StatusCode::NOT_FOUND,
        ),
    ];
    for (body, status) in cases {
        let response = trade(&app, "alice", body.clone()).await;
        assert_eq!(response.status(), status, "body: {body}");
    }

    let unknown_user = trade(
        &app,
        "nobody",
        json!({ "ticker": "SAP.DE", "shares": 1, "tradeType": "buy" }),
    )
    .await;
    assert_eq!(unknown_user.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/portfolio/alice")).await.unwrap();
    let portfolio: Portfolio = read_json(response).await;
    assert_eq!(portfolio.cash, 10_000.0);
    assert!(portfolio.history.is_empty());
}

#[tokio::test]
async fn test_valuation() {
    let (app, _dir) = setup_with_user("alice").await;
    trade(
        &app,
        "alice",
        json!({ "ticker": "7203.T", "shares": 100, "tradeType": "buy" }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(get("/portfolio/alice/valuation"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let valuation: PortfolioValuation = read_json(response).await;
    assert_eq!(valuation.currency, "EUR");
    assert_eq!(valuation.positions.len(), 1);
    assert!((valuation.total_value - 10_000.0).abs() < 1e-6);

    let missing = app.oneshot(get("/portfolio/nobody/valuation")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_trade_body_is_bad_request_with_message() {
    let (app, _dir) = setup_with_user("alice").await;

    for body in [
        json!({ "ticker": "SAP.DE", "shares": 2.5, "tradeType": "buy" }),
        json!({ "ticker": "SAP.DE", "shares": "3", "tradeType": "buy" }),
    ] {
        let response = trade(&app, "alice", body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let error: ErrorBody = read_json(response).await;
        assert!(error.message.starts_with("Invalid request"), "{}", error.message);
    }

    let response = app
        .clone()
        .oneshot(raw_json_request(
            Method::POST,
            "/portfolio/alice/trade",
            "{ not json",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let _: ErrorBody = read_json(response).await;

    let response = app.oneshot(get("/portfolio/alice")).await.unwrap();
    let portfolio: Portfolio = read_json(response).await;
    assert!(portfolio.history.is_empty());
}
