// tests/metrics_ingest.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use crypto_trend_aggregator::api::{self, AppState};
use crypto_trend_aggregator::classify::{CryptoClassifier, KeywordTable};
use crypto_trend_aggregator::ingest::retry::RetryPolicy;
use crypto_trend_aggregator::ingest::scheduler::LiveJob;
use crypto_trend_aggregator::ingest::types::{FetchRequest, RawPost, SourceConnector};
use crypto_trend_aggregator::ingest::Pipeline;
use crypto_trend_aggregator::metrics::Metrics;
use crypto_trend_aggregator::sentiment::LexiconScorer;
use crypto_trend_aggregator::store::TrendStore;

struct OnePost;

#[async_trait]
impl SourceConnector for OnePost {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawPost>> {
        match request {
            FetchRequest::Latest { .. } => Ok(vec![RawPost {
                id: "m1".into(),
                title: "bitcoin is great".into(),
                body: None,
                score: 1,
                num_comments: 0,
                created: Utc::now(),
            }]),
            FetchRequest::Window { .. } => Err(anyhow!("no archive")),
        }
    }

    async fn top_comments(&self, _post: &RawPost, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "OnePost"
    }
}

#[tokio::test]
async fn ingest_metrics_are_served_from_the_ingesting_process() {
    // Installs the global recorder; only one such test per binary.
    let metrics = Metrics::init().expect("recorder");
    let (addr, _server) = metrics.spawn_server("127.0.0.1:0").await.expect("metrics server");

    let store = Arc::new(TrendStore::open_in_memory().unwrap());
    let pipeline = Arc::new(Pipeline::new(
        CryptoClassifier::new(KeywordTable::builtin()),
        Arc::new(LexiconScorer::new()),
        store.clone(),
        RetryPolicy::new(2, Duration::ZERO),
    ));
    let job = LiveJob::new(pipeline, Arc::new(OnePost), 5);
    let report = job.trigger().await.expect("pass runs");
    assert_eq!(report.stored, 1);

    // standalone /metrics listener next to the live job
    let text = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .expect("scrape")
        .text()
        .await
        .expect("body");
    for needle in [
        "ingest_posts_fetched_total",
        "ingest_records_stored_total",
        "ingest_runs_total",
        "ingest_pipeline_last_run_ts",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }

    // same series through the combined API router
    let app = api::app(AppState::new(store), &metrics);
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ingest_records_stored_total"));
}
