// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod record;
pub mod sentiment;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::classify::{CryptoClassifier, KeywordTable, UNKNOWN_CRYPTO};
pub use crate::ingest::types::{FetchRequest, RawPost, SourceConnector};
pub use crate::ingest::Pipeline;
pub use crate::record::TrendRecord;
pub use crate::sentiment::{SentimentScorer, SentimentScores};
pub use crate::store::{RecordSink, TrendStore};
