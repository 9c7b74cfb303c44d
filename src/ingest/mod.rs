// src/ingest/mod.rs
pub mod backfill;
pub mod config;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod types;

use crate::classify::CryptoClassifier;
use crate::ingest::retry::{RetryOutcome, RetryPolicy};
use crate::ingest::types::{FetchRequest, RawPost, SourceConnector};
use crate::record::{assemble, TrendRecord};
use crate::sentiment::SentimentScorer;
use crate::store::RecordSink;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_posts_fetched_total",
            "Posts returned by source connectors."
        );
        describe_counter!(
            "ingest_records_stored_total",
            "Trend records written to the store."
        );
        describe_counter!(
            "ingest_records_failed_total",
            "Records lost to persistence errors."
        );
        describe_counter!(
            "ingest_records_suspect_total",
            "Records whose sentiment had to be clamped."
        );
        describe_counter!(
            "ingest_posts_malformed_total",
            "Upstream items skipped for missing fields."
        );
        describe_counter!(
            "ingest_fetch_retries_total",
            "Failed fetch attempts that were retried."
        );
        describe_counter!(
            "ingest_fetch_exhausted_total",
            "Fetches that failed after all retries."
        );
        describe_counter!(
            "ingest_chunks_skipped_total",
            "Backfill chunks skipped after retry exhaustion."
        );
        describe_counter!("ingest_runs_total", "Live passes triggered.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when an ingest pass last finished."
        );
    });
}

/// Normalize upstream text: decode HTML entities, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// Counters for one live pass or one backfill chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
    pub suspect: usize,
    /// The fetch itself was exhausted; nothing was processed.
    pub fetch_failed: bool,
}

impl PassReport {
    pub fn absorb(&mut self, other: &PassReport) {
        self.fetched += other.fetched;
        self.stored += other.stored;
        self.failed += other.failed;
        self.suspect += other.suspect;
        self.fetch_failed |= other.fetch_failed;
    }
}

/// Fetch → classify + score → assemble → persist, one post at a time.
pub struct Pipeline {
    classifier: CryptoClassifier,
    scorer: Arc<dyn SentimentScorer>,
    sink: Arc<dyn RecordSink>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        classifier: CryptoClassifier,
        scorer: Arc<dyn SentimentScorer>,
        sink: Arc<dyn RecordSink>,
        retry: RetryPolicy,
    ) -> Self {
        ensure_metrics_described();
        Self {
            classifier,
            scorer,
            sink,
            retry,
        }
    }

    pub fn classifier(&self) -> &CryptoClassifier {
        &self.classifier
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch through the retry policy. Exhaustion is a value, never an error.
    pub async fn fetch(
        &self,
        connector: &dyn SourceConnector,
        request: &FetchRequest,
    ) -> RetryOutcome<Vec<RawPost>> {
        let context = format!("{} {}", connector.name(), request);
        let outcome = self
            .retry
            .execute(&context, move || connector.fetch(request))
            .await;
        if let RetryOutcome::Success(posts) = &outcome {
            counter!("ingest_posts_fetched_total").increment(posts.len() as u64);
        }
        outcome
    }

    /// Classify and score one post. No I/O beyond the optional comment fetch.
    pub async fn build_record(&self, connector: &dyn SourceConnector, post: &RawPost) -> TrendRecord {
        let crypto = self.classifier.classify(post, connector).await;
        let text = if post.title.is_empty() {
            post.body.as_deref().unwrap_or_default()
        } else {
            post.title.as_str()
        };
        let sentiment = self.scorer.score(text);
        assemble(post, &crypto, sentiment)
    }

    /// Process posts in order. A failed insert is logged and skipped.
    pub async fn store_posts(
        &self,
        connector: &dyn SourceConnector,
        posts: Vec<RawPost>,
    ) -> PassReport {
        let mut report = PassReport {
            fetched: posts.len(),
            ..PassReport::default()
        };

        for post in posts {
            let record = self.build_record(connector, &post).await;
            if record.suspect {
                report.suspect += 1;
                counter!("ingest_records_suspect_total").increment(1);
            }
            match self.sink.insert(&record) {
                Ok(id) => {
                    report.stored += 1;
                    counter!("ingest_records_stored_total").increment(1);
                    tracing::debug!(
                        target: "ingest",
                        id,
                        crypto = %record.crypto,
                        score = record.score,
                        num_comments = record.num_comments,
                        created = %record.created_text(),
                        compound = record.sentiment.compound,
                        "stored trend record"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("ingest_records_failed_total").increment(1);
                    tracing::warn!(
                        target: "ingest",
                        post_id = %post.id,
                        error = ?e,
                        "persisting record failed, skipping"
                    );
                }
            }
        }
        report
    }

    /// One live pass over the newest `limit` posts.
    pub async fn run_live_once(&self, connector: &dyn SourceConnector, limit: usize) -> PassReport {
        let request = FetchRequest::Latest { limit };
        let report = match self.fetch(connector, &request).await {
            RetryOutcome::Success(posts) => self.store_posts(connector, posts).await,
            RetryOutcome::Exhausted { .. } => PassReport {
                fetch_failed: true,
                ..PassReport::default()
            },
        };

        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            provider = connector.name(),
            fetched = report.fetched,
            stored = report.stored,
            failed = report.failed,
            suspect = report.suspect,
            fetch_failed = report.fetch_failed,
            "live pass finished"
        );
        report
    }
}
