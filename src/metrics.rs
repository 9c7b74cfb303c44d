// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process, before
    /// any ingest work, or the counters recorded earlier are lost.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        crate::ingest::ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    /// Serve only `/metrics` on `bind` in a background task, for processes
    /// that ingest without the read API. Returns the bound address.
    pub async fn spawn_server(&self, bind: &str) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("binding metrics listener {bind}"))?;
        let addr = listener.local_addr().context("metrics listener address")?;
        let app = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = ?e, "metrics server stopped");
            }
        });
        tracing::info!(%addr, "serving /metrics");
        Ok((addr, handle))
    }
}
