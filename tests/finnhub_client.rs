//! Finnhub client against a local stub of the REST API.

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use heatmap_backend::{
    models::TrackedTicker,
    provider::{FinnhubClient, ProviderError, QuoteProvider},
};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpListener;

const TOKEN: &str = "test-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("X-Finnhub-Token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == TOKEN)
}

async fn profile(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match q.get("symbol").map(String::as_str) {
        Some("AAPL") => Json(json!({
            "marketCapitalization": 3_000_000.5,
            "logo": "https://static.finnhub.io/logo/aapl.png",
            "name": "Apple Inc"
        }))
        .into_response(),
        Some("LIMIT") => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Some("NOCAP") => Json(json!({})).into_response(),
        Some("ARRAY") => Json(json!([1, 2, 3])).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn quote(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match q.get("symbol").map(String::as_str) {
        Some("AAPL") => Json(json!({ "c": 190.1, "dp": -1.25 })).into_response(),
        Some("LIMIT") => Json(json!({ "c": 1.0, "dp": 0.0 })).into_response(),
        Some("NOCAP") => Json(json!({ "c": 12.0, "dp": null })).into_response(),
        Some("ARRAY") => Json(json!({ "c": 1.0, "dp": 1.0 })).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Serve the stub on an ephemeral port and return its base URL
async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/api/v1/stock/profile2", get(profile))
        .route("/api/v1/quote", get(quote));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1/")
}

fn ticker(symbol: &str) -> TrackedTicker {
    TrackedTicker::new(symbol, format!("{symbol} name"), "科技")
}

#[tokio::test]
async fn test_fetch_merges_profile_and_quote() {
    let base = spawn_stub().await;
    let client = FinnhubClient::with_base_url(TOKEN, &base, Duration::from_secs(5)).unwrap();

    let snapshot = client.fetch_ticker(&ticker("AAPL")).await.unwrap();
    assert_eq!(snapshot.ticker, "AAPL");
    assert_eq!(snapshot.name, "AAPL name");
    assert_eq!(snapshot.sector, "科技");
    assert_eq!(snapshot.market_cap, 3_000_000.5);
    assert_eq!(snapshot.change_percent, -1.25);
    assert_eq!(snapshot.logo_url, "https://static.finnhub.io/logo/aapl.png");
}

#[tokio::test]
async fn test_missing_profile_fields_default_to_zero() {
    let base = spawn_stub().await;
    let client = FinnhubClient::with_base_url(TOKEN, &base, Duration::from_secs(5)).unwrap();

    let snapshot = client.fetch_ticker(&ticker("NOCAP")).await.unwrap();
    assert_eq!(snapshot.market_cap, 0.0);
    assert_eq!(snapshot.change_percent, 0.0);
    assert_eq!(snapshot.logo_url, "");
}

#[tokio::test]
async fn test_rate_limit_on_either_request_skips_ticker() {
    let base = spawn_stub().await;
    let client = FinnhubClient::with_base_url(TOKEN, &base, Duration::from_secs(5)).unwrap();

    let err = client.fetch_ticker(&ticker("LIMIT")).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited));
}

#[tokio::test]
async fn test_non_object_body_is_malformed() {
    let base = spawn_stub().await;
    let client = FinnhubClient::with_base_url(TOKEN, &base, Duration::from_secs(5)).unwrap();

    let err = client.get_profile("ARRAY").await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

#[tokio::test]
async fn test_server_error_and_bad_token() {
    let base = spawn_stub().await;
    let client = FinnhubClient::with_base_url(TOKEN, &base, Duration::from_secs(5)).unwrap();
    let err = client.get_quote("UNKNOWN").await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 500, .. }));

    let wrong = FinnhubClient::with_base_url("other", &base, Duration::from_secs(5)).unwrap();
    let err = wrong.get_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        FinnhubClient::with_base_url(TOKEN, &format!("http://{addr}"), Duration::from_secs(2))
            .unwrap();
    let err = client.get_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
}
