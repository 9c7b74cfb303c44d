// src/record.rs
//! Trend record assembly.
//!
//! `assemble` is pure: it merges a raw post, the classifier verdict and the
//! scorer output into one [`TrendRecord`]. Out-of-range scores are clamped and
//! the record is flagged `suspect`, never dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::UNKNOWN_CRYPTO;
use crate::ingest::types::RawPost;
use crate::sentiment::SentimentScores;

/// Allowed drift of `neg + neu + pos` away from 1.0.
pub const SENTIMENT_SUM_TOLERANCE: f64 = 0.01;

/// Storage format of `created` (UTC).
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRecord {
    pub title: String,
    pub crypto: String,
    pub score: i64,
    pub num_comments: u32,
    pub created: DateTime<Utc>,
    pub sentiment: SentimentScores,
    /// Scorer output needed fixing. Logged and counted, not persisted.
    #[serde(skip)]
    pub suspect: bool,
}

impl TrendRecord {
    pub fn created_text(&self) -> String {
        self.created.format(CREATED_FORMAT).to_string()
    }
}

/// Clamp each component into its range. Returns the fixed scores and whether
/// anything was changed or the component sum is off.
pub fn validate_sentiment(s: SentimentScores) -> (SentimentScores, bool) {
    fn fix(x: f64, lo: f64, hi: f64) -> (f64, bool) {
        if !x.is_finite() {
            return (0.0, true);
        }
        let c = x.clamp(lo, hi);
        (c, c != x)
    }

    let (neg, a) = fix(s.neg, 0.0, 1.0);
    let (neu, b) = fix(s.neu, 0.0, 1.0);
    let (pos, c) = fix(s.pos, 0.0, 1.0);
    let (compound, d) = fix(s.compound, -1.0, 1.0);
    let off_sum = ((neg + neu + pos) - 1.0).abs() > SENTIMENT_SUM_TOLERANCE;

    (
        SentimentScores {
            neg,
            neu,
            pos,
            compound,
        },
        a || b || c || d || off_sum,
    )
}

pub fn assemble(post: &RawPost, crypto: &str, sentiment: SentimentScores) -> TrendRecord {
    let (sentiment, suspect) = validate_sentiment(sentiment);
    if suspect {
        tracing::warn!(
            target: "ingest",
            post_id = %post.id,
            neg = sentiment.neg,
            neu = sentiment.neu,
            pos = sentiment.pos,
            compound = sentiment.compound,
            "sentiment out of range, clamped and flagged suspect"
        );
    }

    let crypto = match crypto.trim() {
        "" => UNKNOWN_CRYPTO.to_string(),
        c => c.to_string(),
    };

    TrendRecord {
        title: post.title.clone(),
        crypto,
        score: post.score,
        num_comments: post.num_comments,
        created: post.created,
        sentiment,
        suspect,
    }
}
