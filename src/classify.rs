// src/classify.rs
//! Crypto mention tagging.
//!
//! Case-insensitive substring lookup against an ordered keyword table:
//! title + body first, then up to five comments, first hit wins.
//! Substring matching means "eth" also hits "something"; that is accepted.

use serde::Deserialize;

use crate::ingest::types::{RawPost, SourceConnector};

/// Sentinel stored when nothing in the post or its comments matched.
pub const UNKNOWN_CRYPTO: &str = "Unknown";

/// How many comments are scanned when the post itself has no hit.
pub const COMMENT_SCAN_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordEntry {
    pub crypto: String,
    pub keywords: Vec<String>,
}

/// Ordered crypto id → patterns. Iteration order decides ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<KeywordEntry>,
}

impl KeywordTable {
    /// Build a table, trimming ids, lowercasing patterns and dropping empties.
    /// Repeated ids are merged into their first position.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut out: Vec<KeywordEntry> = Vec::new();
        for (crypto, keywords) in entries {
            let id = crypto.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            let pos = match out.iter().position(|e| e.crypto == id) {
                Some(p) => p,
                None => {
                    out.push(KeywordEntry {
                        crypto: id.to_string(),
                        keywords: Vec::new(),
                    });
                    out.len() - 1
                }
            };
            let slot = &mut out[pos].keywords;
            for k in keywords {
                let k = k.as_ref().trim().to_lowercase();
                if !k.is_empty() && !slot.contains(&k) {
                    slot.push(k);
                }
            }
        }
        out.retain(|e| !e.keywords.is_empty());
        Self { entries: out }
    }

    pub fn from_entries(entries: Vec<KeywordEntry>) -> Self {
        Self::new(entries.into_iter().map(|e| (e.crypto, e.keywords)))
    }

    /// Table used when no keyword file is configured.
    pub fn builtin() -> Self {
        Self::new([
            ("bitcoin", vec!["bitcoin", "btc"]),
            ("ethereum", vec!["ethereum", "eth"]),
            ("solana", vec!["solana", "sol"]),
            ("dogecoin", vec!["dogecoin", "doge"]),
            ("xrp", vec!["xrp"]),
        ])
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First crypto (in table order) with a pattern contained in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|e| e.crypto.as_str())
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone)]
pub struct CryptoClassifier {
    table: KeywordTable,
    comment_limit: usize,
}

impl CryptoClassifier {
    pub fn new(table: KeywordTable) -> Self {
        Self {
            table,
            comment_limit: COMMENT_SCAN_LIMIT,
        }
    }

    pub fn with_comment_limit(mut self, limit: usize) -> Self {
        self.comment_limit = limit;
        self
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Step 1: title plus body (body skipped when absent).
    pub fn match_post(&self, post: &RawPost) -> Option<&str> {
        match post.body.as_deref().filter(|b| !b.is_empty()) {
            Some(body) => self.table.first_match(&format!("{} {}", post.title, body)),
            None => self.table.first_match(&post.title),
        }
    }

    /// Step 2: comment by comment, table entry by entry within each comment.
    pub fn match_comments<S: AsRef<str>>(&self, comments: &[S]) -> Option<&str> {
        comments
            .iter()
            .take(self.comment_limit)
            .find_map(|c| self.table.first_match(c.as_ref()))
    }

    /// Full classification. Comments are only fetched when the post itself has
    /// no hit and reports at least one comment; a failed comment fetch counts
    /// as no comments.
    pub async fn classify<C>(&self, post: &RawPost, source: &C) -> String
    where
        C: SourceConnector + ?Sized,
    {
        if let Some(hit) = self.match_post(post) {
            return hit.to_string();
        }
        if post.num_comments == 0 || self.comment_limit == 0 {
            return UNKNOWN_CRYPTO.to_string();
        }

        match source.top_comments(post, self.comment_limit).await {
            Ok(comments) => self
                .match_comments(&comments)
                .unwrap_or(UNKNOWN_CRYPTO)
                .to_string(),
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    post_id = %post.id,
                    provider = source.name(),
                    error = ?e,
                    "comment fetch failed, classifying without comments"
                );
                UNKNOWN_CRYPTO.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(title: &str, body: Option<&str>) -> RawPost {
        RawPost {
            id: "abc".into(),
            title: title.into(),
            body: body.map(str::to_string),
            score: 1,
            num_comments: 0,
            created: Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn builtin_table_order_is_stable() {
        let t = KeywordTable::builtin();
        let ids: Vec<&str> = t.entries().iter().map(|e| e.crypto.as_str()).collect();
        assert_eq!(ids, vec!["bitcoin", "ethereum", "solana", "dogecoin", "xrp"]);
    }

    #[test]
    fn new_cleans_and_merges() {
        let t = KeywordTable::new([
            (" bitcoin ", vec!["BTC", " ", "btc"]),
            ("", vec!["x"]),
            ("bitcoin", vec!["Sats"]),
            ("empty", vec![]),
        ]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.entries()[0].keywords, vec!["btc", "sats"]);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let t = KeywordTable::builtin();
        assert_eq!(t.first_match("Is DOGE back?"), Some("dogecoin"));
        // accepted false positive: "eth" inside "something"
        assert_eq!(t.first_match("something happened"), Some("ethereum"));
        assert_eq!(t.first_match(""), None);
    }

    #[test]
    fn table_order_breaks_ties() {
        let c = CryptoClassifier::new(KeywordTable::builtin());
        assert_eq!(
            c.match_post(&post("ETH flips BTC?", None)),
            Some("bitcoin")
        );
    }

    #[test]
    fn body_is_scanned_after_title() {
        let c = CryptoClassifier::new(KeywordTable::builtin());
        assert_eq!(
            c.match_post(&post("Daily thread", Some("anyone buying xrp"))),
            Some("xrp")
        );
        assert_eq!(c.match_post(&post("Daily thread", Some(""))), None);
    }

    #[test]
    fn comment_scan_respects_limit() {
        let c = CryptoClassifier::new(KeywordTable::builtin()).with_comment_limit(2);
        let comments = vec!["nope", "still nope", "bitcoin"];
        assert_eq!(c.match_comments(&comments), None);
        let c5 = CryptoClassifier::new(KeywordTable::builtin());
        assert_eq!(c5.match_comments(&comments), Some("bitcoin"));
    }
}
