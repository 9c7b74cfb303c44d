// src/config/app.rs
use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::backfill::{BackfillOptions, DEFAULT_CHUNK_SECS};
use crate::ingest::providers::reddit::{RedditCredentials, DEFAULT_USER_AGENT};
use crate::ingest::providers::twitter::DEFAULT_TWITTER_QUERY;
use crate::ingest::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::ingest::types::DEFAULT_PAGE_SIZE;

pub const ENV_DB_PATH: &str = "TREND_DB_PATH";
pub const ENV_SUBREDDIT: &str = "TREND_SUBREDDIT";
pub const ENV_LIVE_LIMIT: &str = "TREND_LIVE_LIMIT";
pub const ENV_LIVE_INTERVAL_SECS: &str = "TREND_LIVE_INTERVAL_SECS";
pub const ENV_RETRY_ATTEMPTS: &str = "TREND_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY_SECS: &str = "TREND_RETRY_DELAY_SECS";
pub const ENV_CHUNK_SECS: &str = "TREND_CHUNK_SECS";
pub const ENV_PAGE_SIZE: &str = "TREND_PAGE_SIZE";
pub const ENV_CHUNK_PAUSE_MS: &str = "TREND_CHUNK_PAUSE_MS";
pub const ENV_API_BIND: &str = "TREND_API_BIND";
pub const ENV_REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_REDDIT_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_REDDIT_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const ENV_PUSHSHIFT_URL: &str = "PUSHSHIFT_URL";
pub const ENV_LIVE_SOURCE: &str = "TREND_LIVE_SOURCE";
pub const ENV_TWITTER_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";
pub const ENV_TWITTER_QUERY: &str = "TWITTER_QUERY";

pub const DEFAULT_DB_PATH: &str = "trend_data.db";
pub const DEFAULT_SUBREDDIT: &str = "CryptoCurrency";
pub const DEFAULT_LIVE_LIMIT: usize = 100;
pub const DEFAULT_LIVE_INTERVAL_SECS: u64 = 6 * 3600;
pub const DEFAULT_API_BIND: &str = "127.0.0.1:5000";
// One year; longer periods overflow the timer arithmetic.
pub const MAX_LIVE_INTERVAL_SECS: u64 = 365 * 24 * 3600;

/// Which connector feeds live mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LiveSource {
    #[default]
    Reddit,
    Twitter,
}

impl FromStr for LiveSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(LiveSource::Reddit),
            "twitter" => Ok(LiveSource::Twitter),
            other => Err(anyhow!("unknown live source '{other}'")),
        }
    }
}

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub subreddit: String,
    pub live_limit: usize,
    pub live_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub chunk_secs: i64,
    pub page_size: usize,
    pub chunk_pause_ms: u64,
    pub api_bind: String,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,
    pub pushshift_url: Option<String>,
    pub live_source: LiveSource,
    pub twitter_bearer_token: Option<String>,
    pub twitter_query: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            subreddit: DEFAULT_SUBREDDIT.to_string(),
            live_limit: DEFAULT_LIVE_LIMIT,
            live_interval_secs: DEFAULT_LIVE_INTERVAL_SECS,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: 5,
            chunk_secs: DEFAULT_CHUNK_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            chunk_pause_ms: 1000,
            api_bind: DEFAULT_API_BIND.to_string(),
            reddit_client_id: None,
            reddit_client_secret: None,
            reddit_user_agent: DEFAULT_USER_AGENT.to_string(),
            pushshift_url: None,
            live_source: LiveSource::Reddit,
            twitter_bearer_token: None,
            twitter_query: DEFAULT_TWITTER_QUERY.to_string(),
        }
    }
}

impl AppConfig {
    /// Read settings from the environment, falling back to defaults.
    /// Unparsable numbers are logged and ignored.
    pub fn from_env() -> Self {
        let d = Self::default();
        let mut cfg = Self {
            db_path: env_string(ENV_DB_PATH).unwrap_or(d.db_path),
            subreddit: env_string(ENV_SUBREDDIT).unwrap_or(d.subreddit),
            live_limit: env_parse(ENV_LIVE_LIMIT, d.live_limit),
            live_interval_secs: env_parse(ENV_LIVE_INTERVAL_SECS, d.live_interval_secs),
            retry_attempts: env_parse(ENV_RETRY_ATTEMPTS, d.retry_attempts),
            retry_delay_secs: env_parse(ENV_RETRY_DELAY_SECS, d.retry_delay_secs),
            chunk_secs: env_parse(ENV_CHUNK_SECS, d.chunk_secs),
            page_size: env_parse(ENV_PAGE_SIZE, d.page_size),
            chunk_pause_ms: env_parse(ENV_CHUNK_PAUSE_MS, d.chunk_pause_ms),
            api_bind: env_string(ENV_API_BIND).unwrap_or(d.api_bind),
            reddit_client_id: env_string(ENV_REDDIT_CLIENT_ID),
            reddit_client_secret: env_string(ENV_REDDIT_CLIENT_SECRET),
            reddit_user_agent: env_string(ENV_REDDIT_USER_AGENT).unwrap_or(d.reddit_user_agent),
            pushshift_url: env_string(ENV_PUSHSHIFT_URL),
            live_source: env_parse(ENV_LIVE_SOURCE, d.live_source),
            twitter_bearer_token: env_string(ENV_TWITTER_BEARER_TOKEN),
            twitter_query: env_string(ENV_TWITTER_QUERY).unwrap_or(d.twitter_query),
        };
        cfg.sanitize();
        cfg
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        if self.live_limit == 0 {
            self.live_limit = d.live_limit;
        }
        if self.live_interval_secs == 0 {
            self.live_interval_secs = d.live_interval_secs;
        }
        if self.retry_attempts == 0 {
            self.retry_attempts = 1;
        }
        if self.chunk_secs <= 0 || chunk_duration(self.chunk_secs).is_none() {
            tracing::warn!(
                var = ENV_CHUNK_SECS,
                value = self.chunk_secs,
                "chunk size out of range, using default"
            );
            self.chunk_secs = d.chunk_secs;
        }
        if self.live_interval_secs > MAX_LIVE_INTERVAL_SECS {
            tracing::warn!(
                var = ENV_LIVE_INTERVAL_SECS,
                value = self.live_interval_secs,
                "live interval too long, capping"
            );
            self.live_interval_secs = MAX_LIVE_INTERVAL_SECS;
        }
        if self.page_size == 0 {
            self.page_size = d.page_size;
        }
        self.subreddit = self.subreddit.trim().trim_start_matches("r/").to_string();
        if self.subreddit.is_empty() {
            self.subreddit = d.subreddit;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    /// Fails when `chunk_secs` does not fit a chrono duration (e.g. set from
    /// the command line after `from_env`).
    pub fn backfill_options(&self) -> Result<BackfillOptions> {
        let chunk = chunk_duration(self.chunk_secs)
            .ok_or_else(|| anyhow!("chunk size {}s is out of range", self.chunk_secs))?;
        Ok(BackfillOptions {
            chunk,
            page_size: self.page_size,
            pause: Duration::from_millis(self.chunk_pause_ms),
        })
    }

    /// Both id and secret must be present for OAuth.
    pub fn reddit_credentials(&self) -> Option<RedditCredentials> {
        match (&self.reddit_client_id, &self.reddit_client_secret) {
            (Some(id), Some(secret)) => Some(RedditCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        }
    }
}

fn chunk_duration(secs: i64) -> Option<chrono::Duration> {
    chrono::Duration::try_seconds(secs)
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match env_string(name) {
        Some(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "unparsable setting, using default");
                default
            }
        },
        None => default,
    }
}
