// tests/api_http.rs
//
// HTTP-level tests for the read API without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use crypto_trend_aggregator::api::{self, AppState};
use crypto_trend_aggregator::ingest::types::RawPost;
use crypto_trend_aggregator::record::assemble;
use crypto_trend_aggregator::sentiment::SentimentScores;
use crypto_trend_aggregator::store::TrendStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn seeded_router() -> Router {
    let store = TrendStore::open_in_memory().expect("in-memory store");
    let rows = [
        ("btc old", "bitcoin", 1),
        ("eth mid", "ethereum", 2),
        ("btc new", "bitcoin", 3),
    ];
    for (title, crypto, day) in rows {
        let post = RawPost {
            id: title.replace(' ', "_"),
            title: title.into(),
            body: None,
            score: 10,
            num_comments: 1,
            created: Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap(),
        };
        let rec = assemble(&post, crypto, SentimentScores::new(0.1, 0.7, 0.2, 0.3));
        store.insert(&rec).expect("insert");
    }
    api::router(AppState::new(Arc::new(store)))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json body");
    (status, v)
}

fn titles(v: &Json) -> Vec<String> {
    v.as_array()
        .expect("array")
        .iter()
        .map(|r| r["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn health_returns_ok() {
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = seeded_router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn trends_lists_all_rows_newest_first() {
    let (status, v) = get_json(seeded_router(), "/trends").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&v), vec!["btc new", "eth mid", "btc old"]);

    let first = &v[0];
    assert_eq!(first["crypto"], "bitcoin");
    assert_eq!(first["created"], "2024-05-03 08:00:00");
    assert_eq!(first["score"], 10);
    assert!(first["sentiment_compound"].is_number());
}

#[tokio::test]
async fn trends_filters_by_crypto() {
    let (status, v) = get_json(seeded_router(), "/trends?crypto=bitcoin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&v), vec!["btc new", "btc old"]);

    let (_, none) = get_json(seeded_router(), "/trends?crypto=cardano").await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_crypto_param_means_no_filter() {
    let (_, v) = get_json(seeded_router(), "/trends?crypto=").await;
    assert_eq!(v.as_array().unwrap().len(), 3);
}
