//! Health check endpoint handler.
//!
//! Reports whether the BBS cache has a usable snapshot and how the last
//! refreshes went, as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use bbs_discovery::{CacheState, RefreshStatus};
use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "Project: https://github.com/herakles-io/bbs-discovery | Support: proc-mem@herakles.io";

/// A snapshot older than this many poll intervals is reported as stale.
const STALE_AFTER_INTERVALS: u32 = 10;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let cache = state.cache();
    let status = cache.status();
    let snapshot = cache.snapshot();
    let stale_after = cache.poll_interval() * STALE_AFTER_INTERVALS;

    let (code, message) = assess(&status, cache.state(), stale_after, Utc::now());

    let mut table = String::new();
    writeln!(table, "{:28} | {}", "Cache state", format!("{:?}", cache.state())).ok();
    writeln!(table, "{:28} | {}", "Snapshot generation", snapshot.generation).ok();
    writeln!(table, "{:28} | {}", "Actual LRPs", snapshot.actual.len()).ok();
    writeln!(table, "{:28} | {}", "Desired LRPs", snapshot.desired.len()).ok();
    writeln!(table, "{:28} | {}", "Last success", fmt_time(status.last_success)).ok();
    writeln!(table, "{:28} | {}", "Last attempt", fmt_time(status.last_attempt)).ok();
    writeln!(
        table,
        "{:28} | {}",
        "Last duration",
        status
            .last_duration
            .map(|d| format!("{:.3}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".into())
    )
    .ok();
    writeln!(table, "{:28} | {}", "Consecutive failures", status.consecutive_failures).ok();
    writeln!(table, "{:28} | {}", "Total failures", status.total_failures).ok();
    writeln!(table, "{:28} | {}", "Skipped records", status.skipped_records).ok();
    writeln!(
        table,
        "{:28} | {}",
        "Last error",
        status.last_error.as_deref().unwrap_or("-")
    )
    .ok();
    writeln!(
        table,
        "{:28} | {}s",
        "Uptime",
        state.started_at.elapsed().as_secs()
    )
    .ok();

    debug!("Health check: {} - {}", code, message);
    (
        code,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{FOOTER_TEXT}"),
    )
}

fn assess(
    status: &RefreshStatus,
    state: CacheState,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> (StatusCode, &'static str) {
    if state == CacheState::Stopped {
        return (StatusCode::SERVICE_UNAVAILABLE, "Cache stopped");
    }
    let Some(last_success) = status.last_success else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Cache not populated yet");
    };

    let age = (now - last_success).to_std().unwrap_or_default();
    if age > stale_after {
        (StatusCode::SERVICE_UNAVAILABLE, "Cache stale")
    } else if status.consecutive_failures > 0 {
        (StatusCode::OK, "OK - last refresh failed, serving previous snapshot")
    } else {
        (StatusCode::OK, "OK")
    }
}

fn fmt_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
}
