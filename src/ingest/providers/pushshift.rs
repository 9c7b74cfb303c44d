// src/ingest/providers/pushshift.rs
//! Historical connector over the Pushshift search API.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{parse_submissions, truncate_body};
use crate::ingest::normalize_text;
use crate::ingest::types::{FetchRequest, RawPost, SourceConnector};

pub const PUSHSHIFT_BASE: &str = "https://api.pushshift.io";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) CryptoDataAggregator/1.0";

// Comments are searched by link id; only top-level ones are kept afterwards.
const COMMENT_PAGE_SIZE: usize = 100;

pub struct PushshiftConnector {
    client: Client,
    subreddit: String,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl PushshiftConnector {
    pub fn new(subreddit: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            subreddit: subreddit.into(),
            base_url: PUSHSHIFT_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn search(&self, kind: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/reddit/search/{kind}/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "pushshift returned {status}: {}",
                truncate_body(&body, 200)
            );
        }
        resp.json().await.context("decoding pushshift json")
    }
}

/// Submissions from a search response, restricted to `[after, before)` and
/// sorted ascending by creation time.
pub fn parse_search(v: &Value, after: DateTime<Utc>, before: DateTime<Utc>) -> Result<Vec<RawPost>> {
    let data = v
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("pushshift response without data array"))?;

    let mut posts = parse_submissions(data, "pushshift");
    let before_len = posts.len();
    posts.retain(|p| p.created >= after && p.created < before);
    if posts.len() != before_len {
        tracing::debug!(
            target: "ingest",
            dropped = before_len - posts.len(),
            "dropped posts outside the requested window"
        );
    }
    posts.sort_by_key(|p| p.created);
    Ok(posts)
}

/// Query for one window. Upstream treats `after` as exclusive, so the bound
/// is moved back one second and `parse_search` re-applies `[after, before)`.
pub fn window_query(
    subreddit: &str,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    size: usize,
) -> Vec<(&'static str, String)> {
    vec![
        ("subreddit", subreddit.to_string()),
        ("after", (after.timestamp() - 1).to_string()),
        ("before", before.timestamp().to_string()),
        ("size", size.to_string()),
        ("sort", "asc".to_string()),
    ]
}

/// Bodies of top-level comments (parent is the submission itself).
pub fn parse_top_level_comments(v: &Value, post_id: &str, limit: usize) -> Vec<String> {
    let link = format!("t3_{post_id}");
    v.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|c| c.get("parent_id").and_then(Value::as_str) == Some(link.as_str()))
                .filter_map(|c| c.get("body").and_then(Value::as_str))
                .map(normalize_text)
                .filter(|b| !b.is_empty())
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SourceConnector for PushshiftConnector {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawPost>> {
        let FetchRequest::Window {
            after,
            before,
            size,
        } = *request
        else {
            bail!("pushshift connector only serves window requests, got {request}");
        };
        let query = window_query(&self.subreddit, after, before, size);
        let v = self.search("submission", &query).await?;
        let mut posts = parse_search(&v, after, before)?;
        posts.truncate(size);
        Ok(posts)
    }

    async fn top_comments(&self, post: &RawPost, limit: usize) -> Result<Vec<String>> {
        let v = self
            .search(
                "comment",
                &[
                    ("link_id", format!("t3_{}", post.id)),
                    ("size", COMMENT_PAGE_SIZE.to_string()),
                    ("sort", "asc".to_string()),
                ],
            )
            .await?;
        Ok(parse_top_level_comments(&v, &post.id, limit))
    }

    fn name(&self) -> &'static str {
        "pushshift"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn search_is_windowed_and_sorted() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let v = json!({ "data": [
            { "id": "late", "title": "b", "created_utc": before.timestamp() - 1 },
            { "id": "early", "title": "a", "created_utc": after.timestamp() },
            { "id": "outside", "title": "c", "created_utc": before.timestamp() },
            { "title": "broken" }
        ]});
        let posts = parse_search(&v, after, before).unwrap();
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn boundary_second_belongs_to_the_later_window() {
        let mid = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let q = window_query("CryptoCurrency", mid, mid + chrono::Duration::days(1), 100);
        let after = q.iter().find(|(k, _)| *k == "after").map(|(_, v)| v.clone());
        assert_eq!(after, Some((mid.timestamp() - 1).to_string()));

        // the extra second upstream returns is trimmed locally
        let v = json!({ "data": [
            { "id": "prev", "title": "x", "created_utc": mid.timestamp() - 1 },
            { "id": "edge", "title": "y", "created_utc": mid.timestamp() }
        ]});
        let posts = parse_search(&v, mid, mid + chrono::Duration::days(1)).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "edge");
    }

    #[test]
    fn search_without_data_is_an_error() {
        let t = Utc::now();
        assert!(parse_search(&json!({ "detail": "rate limited" }), t, t).is_err());
    }

    #[test]
    fn only_top_level_comments_are_kept() {
        let v = json!({ "data": [
            { "parent_id": "t3_p1", "body": "first &amp; best" },
            { "parent_id": "t1_zzz", "body": "a reply" },
            { "parent_id": "t3_p1", "body": "second" },
            { "parent_id": "t3_p1", "body": "third" }
        ]});
        assert_eq!(
            parse_top_level_comments(&v, "p1", 2),
            vec!["first & best".to_string(), "second".into()]
        );
        assert!(parse_top_level_comments(&json!({}), "p1", 5).is_empty());
    }

    #[tokio::test]
    async fn latest_requests_are_rejected() {
        let c = PushshiftConnector::new("CryptoCurrency");
        assert!(c.fetch(&FetchRequest::Latest { limit: 10 }).await.is_err());
    }
}
