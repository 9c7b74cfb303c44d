// src/ingest/providers/mod.rs
pub mod pushshift;
pub mod reddit;
pub mod twitter;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::normalize_text;
use crate::ingest::types::RawPost;

/// Submission fields shared by the Reddit listing and Pushshift search APIs.
#[derive(Debug, Deserialize)]
struct Submission {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    created_utc: Option<f64>,
}

impl Submission {
    /// `None` when the item lacks an id or a usable creation time.
    fn into_raw_post(self) -> Option<RawPost> {
        let id = self.id.filter(|s| !s.trim().is_empty())?;
        let created = self
            .created_utc
            .filter(|t| t.is_finite())
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.trunc() as i64, 0))?;

        let body = self
            .selftext
            .map(|s| normalize_text(&s))
            .filter(|s| !s.is_empty() && s != "[removed]" && s != "[deleted]");

        Some(RawPost {
            id,
            title: self
                .title
                .as_deref()
                .map(normalize_text)
                .unwrap_or_default(),
            body,
            score: self.score.unwrap_or(0),
            num_comments: self
                .num_comments
                .unwrap_or(0)
                .clamp(0, i64::from(u32::MAX)) as u32,
            created,
        })
    }
}

/// Parse each item on its own; malformed ones are logged and skipped.
pub(crate) fn parse_submissions<'a, I>(items: I, provider: &'static str) -> Vec<RawPost>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut out = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let parsed = serde_json::from_value::<Submission>(item.clone())
            .ok()
            .and_then(Submission::into_raw_post);
        match parsed {
            Some(p) => out.push(p),
            None => {
                counter!("ingest_posts_malformed_total").increment(1);
                tracing::warn!(
                    target: "ingest",
                    provider,
                    index = idx,
                    "skipping malformed post (missing id or created_utc)"
                );
            }
        }
    }
    out
}

/// Keep at most `max` chars of an upstream error body for logs.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        return body.to_string();
    }
    let mut s: String = body.chars().take(max).collect();
    s.push('…');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submission_fields_map_to_raw_post() {
        let items = vec![json!({
            "id": "1abc",
            "title": "ETH &amp; SOL   season",
            "selftext": "",
            "score": -3,
            "num_comments": 12,
            "created_utc": 1704448800.0
        })];
        let posts = parse_submissions(&items, "test");
        assert_eq!(posts.len(), 1);
        let p = &posts[0];
        assert_eq!(p.title, "ETH & SOL season");
        assert_eq!(p.body, None);
        assert_eq!(p.score, -3);
        assert_eq!(p.num_comments, 12);
        assert_eq!(p.created.to_rfc3339(), "2024-01-05T10:00:00+00:00");
    }

    #[test]
    fn integer_timestamps_and_missing_counts_are_fine() {
        let items = vec![json!({ "id": "x", "title": "hi", "created_utc": 1704448800 })];
        let posts = parse_submissions(&items, "test");
        assert_eq!(posts[0].score, 0);
        assert_eq!(posts[0].num_comments, 0);
    }

    #[test]
    fn malformed_items_are_skipped_not_fatal() {
        let items = vec![
            json!({ "title": "no id", "created_utc": 1.0 }),
            json!({ "id": "no-created", "title": "x" }),
            json!("not an object"),
            json!({ "id": "ok", "title": "fine", "selftext": "[removed]", "created_utc": 10 }),
        ];
        let posts = parse_submissions(&items, "test");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "ok");
        assert_eq!(posts[0].body, None);
    }

    #[test]
    fn truncate_body_caps_length() {
        assert_eq!(truncate_body("short", 10), "short");
        assert_eq!(truncate_body("abcdef", 3), "abc…");
    }
}
