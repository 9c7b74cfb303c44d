// src/ingest/backfill.rs
//! Historical sweep over `[start, end)` in fixed-size windows.
//!
//! Chunks run strictly in ascending order. A chunk whose fetch is exhausted is
//! skipped (nothing stored for it) and the sweep moves on.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use metrics::{counter, gauge};
use std::time::Duration as StdDuration;

use crate::ingest::retry::RetryOutcome;
use crate::ingest::types::{FetchRequest, SourceConnector, DEFAULT_PAGE_SIZE};
use crate::ingest::{PassReport, Pipeline};

pub const DEFAULT_CHUNK_SECS: i64 = 86_400;
pub const DEFAULT_CHUNK_PAUSE: StdDuration = StdDuration::from_secs(1);

/// One historical window, `[after, before)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl Chunk {
    pub fn request(&self, size: usize) -> FetchRequest {
        FetchRequest::Window {
            after: self.after,
            before: self.before,
            size,
        }
    }
}

/// Split `[start, end)` into contiguous windows of `chunk`; the last one is
/// cut at `end`. An empty range yields no chunks.
pub fn plan_chunks(start: DateTime<Utc>, end: DateTime<Utc>, chunk: Duration) -> Result<Vec<Chunk>> {
    if chunk <= Duration::zero() {
        bail!("chunk size must be positive, got {}s", chunk.num_seconds());
    }
    let mut out = Vec::new();
    let mut after = start;
    while after < end {
        let before = after
            .checked_add_signed(chunk)
            .map(|b| b.min(end))
            .unwrap_or(end);
        out.push(Chunk { after, before });
        after = before;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Fetching,
    Stored,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub chunk: Chunk,
    pub state: ChunkState,
    pub pass: PassReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub chunks: Vec<ChunkReport>,
}

impl BackfillReport {
    pub fn totals(&self) -> PassReport {
        let mut t = PassReport::default();
        for c in &self.chunks {
            t.absorb(&c.pass);
        }
        t
    }

    pub fn skipped(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Skipped)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub chunk: Duration,
    pub page_size: usize,
    /// Pause between chunk fetches, to stay under upstream rate limits.
    pub pause: StdDuration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            chunk: Duration::seconds(DEFAULT_CHUNK_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            pause: DEFAULT_CHUNK_PAUSE,
        }
    }
}

/// Sweep `[start, end)`. Only an invalid chunk size is an error; upstream
/// failures end up as skipped chunks in the report.
pub async fn run_backfill(
    pipeline: &Pipeline,
    connector: &dyn SourceConnector,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    opts: &BackfillOptions,
) -> Result<BackfillReport> {
    let chunks = plan_chunks(start, end, opts.chunk)?;
    tracing::info!(
        target: "ingest",
        provider = connector.name(),
        start = %start,
        end = %end,
        chunks = chunks.len(),
        "backfill starting"
    );

    let mut report = BackfillReport {
        chunks: chunks
            .iter()
            .map(|c| ChunkReport {
                chunk: *c,
                state: ChunkState::Pending,
                pass: PassReport::default(),
            })
            .collect(),
    };

    let total = report.chunks.len();
    for (i, entry) in report.chunks.iter_mut().enumerate() {
        entry.state = ChunkState::Fetching;
        let request = entry.chunk.request(opts.page_size);
        tracing::info!(target: "ingest", chunk = i + 1, of = total, "fetching {}", request);

        match pipeline.fetch(connector, &request).await {
            RetryOutcome::Success(posts) => {
                if posts.is_empty() {
                    tracing::info!(target: "ingest", "no posts found in this interval");
                }
                entry.pass = pipeline.store_posts(connector, posts).await;
                entry.state = ChunkState::Stored;
            }
            RetryOutcome::Exhausted { attempts, .. } => {
                tracing::warn!(
                    target: "ingest",
                    attempts,
                    "skipping chunk {} after exhausting retries",
                    request
                );
                counter!("ingest_chunks_skipped_total").increment(1);
                entry.pass.fetch_failed = true;
                entry.state = ChunkState::Skipped;
            }
        }

        if i + 1 < total && !opts.pause.is_zero() {
            tokio::time::sleep(opts.pause).await;
        }
    }

    gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
    let totals = report.totals();
    tracing::info!(
        target: "ingest",
        chunks = total,
        skipped = report.skipped(),
        fetched = totals.fetched,
        stored = totals.stored,
        failed = totals.failed,
        "backfill finished"
    );
    Ok(report)
}

/// Parse a range boundary: `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_boundary(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = d
            .and_hms_opt(0, 0, 0)
            .context("building midnight timestamp")?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD or RFC 3339"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn even_range_splits_into_full_days() {
        let c = plan_chunks(at(1, 0), at(4, 0), Duration::days(1)).unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c[0], Chunk { after: at(1, 0), before: at(2, 0) });
        assert_eq!(c[2].before, at(4, 0));
    }

    #[test]
    fn last_chunk_is_shorter() {
        let c = plan_chunks(at(1, 0), at(2, 6), Duration::days(1)).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[1], Chunk { after: at(2, 0), before: at(2, 6) });
    }

    #[test]
    fn chunks_are_contiguous_and_cover_range() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        for secs in [60_i64, 3_600, 7_000, 86_400, 10 * 86_400, 400 * 86_400] {
            let c = plan_chunks(start, end, Duration::seconds(secs)).unwrap();
            assert_eq!(c.first().unwrap().after, start);
            assert_eq!(c.last().unwrap().before, end);
            for w in c.windows(2) {
                assert_eq!(w[0].before, w[1].after);
                assert!(w[0].after < w[0].before);
            }
            for ch in &c[..c.len() - 1] {
                assert_eq!(ch.before - ch.after, Duration::seconds(secs));
            }
        }
    }

    #[test]
    fn empty_or_inverted_range_has_no_chunks() {
        assert!(plan_chunks(at(2, 0), at(2, 0), Duration::days(1)).unwrap().is_empty());
        assert!(plan_chunks(at(3, 0), at(2, 0), Duration::days(1)).unwrap().is_empty());
    }

    #[test]
    fn non_positive_chunk_is_rejected() {
        assert!(plan_chunks(at(1, 0), at(2, 0), Duration::zero()).is_err());
        assert!(plan_chunks(at(1, 0), at(2, 0), Duration::seconds(-5)).is_err());
    }

    #[test]
    fn boundaries_parse_both_formats() {
        assert_eq!(parse_boundary("2024-01-05").unwrap(), at(5, 0));
        assert_eq!(parse_boundary("2024-01-05T10:00:00Z").unwrap(), at(5, 10));
        assert_eq!(
            parse_boundary("2024-01-05T12:00:00+02:00").unwrap(),
            at(5, 10)
        );
        assert!(parse_boundary("Jan 5").is_err());
    }
}
