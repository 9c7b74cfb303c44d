// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// Default page bound for historical window requests.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One upstream post as the connectors hand it to the pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawPost {
    pub id: String,           // upstream id without the `t3_` prefix
    pub title: String,        // normalized, may be empty
    pub body: Option<String>, // self text, None when absent or blank
    pub score: i64,           // net upvotes
    pub num_comments: u32,
    pub created: DateTime<Utc>,
}

/// One unit of work for a [`SourceConnector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRequest {
    /// Most recent `limit` posts, source-native order.
    Latest { limit: usize },
    /// Posts created in `[after, before)`, ascending, at most `size`.
    Window {
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        size: usize,
    },
}

impl FetchRequest {
    pub fn window(after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        FetchRequest::Window {
            after,
            before,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchRequest::Latest { limit } => write!(f, "latest {limit} posts"),
            FetchRequest::Window { after, before, size } => write!(
                f,
                "interval {} to {} (size {size})",
                after.format("%Y-%m-%d %H:%M:%S"),
                before.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetch one page of posts. A non-success upstream status is an error.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawPost>>;

    /// Up to `limit` comment bodies for `post`, in upstream order.
    async fn top_comments(&self, post: &RawPost, limit: usize) -> Result<Vec<String>>;

    fn name(&self) -> &'static str;
}
