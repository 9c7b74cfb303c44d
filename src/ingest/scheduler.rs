// src/ingest/scheduler.rs
use crate::ingest::types::SourceConnector;
use crate::ingest::{PassReport, Pipeline};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Live ingestion job: `Idle → Running → Idle` per trigger.
pub struct LiveJob {
    pipeline: Arc<Pipeline>,
    connector: Arc<dyn SourceConnector>,
    limit: usize,
    running: AtomicBool,
}

impl LiveJob {
    pub fn new(pipeline: Arc<Pipeline>, connector: Arc<dyn SourceConnector>, limit: usize) -> Self {
        Self {
            pipeline,
            connector,
            limit,
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> JobState {
        if self.running.load(Ordering::SeqCst) {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    /// Run one pass. Returns `None` if a pass is already running.
    /// The job is back to `Idle` afterwards whatever happened to the records.
    pub async fn trigger(&self) -> Option<PassReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(target: "ingest", "live pass already running, trigger ignored");
            return None;
        }

        tracing::info!(target: "ingest", "starting data aggregation job");
        let report = self
            .pipeline
            .run_live_once(self.connector.as_ref(), self.limit)
            .await;
        counter!("ingest_runs_total").increment(1);

        self.running.store(false, Ordering::SeqCst);
        Some(report)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LiveSchedulerCfg {
    pub interval_secs: u64,
}

/// Spawn the periodic live job. The first tick fires immediately, so one pass
/// runs at startup and then every `interval_secs`.
pub fn spawn_live_scheduler(job: Arc<LiveJob>, cfg: LiveSchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(report) = job.trigger().await {
                tracing::info!(
                    target: "ingest",
                    stored = report.stored,
                    next_in_secs = period.as_secs(),
                    "live tick done"
                );
            }
        }
    })
}
