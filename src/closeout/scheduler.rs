//! Weekly closeout scheduler.
//!
//! Sleeps until the next Monday 00:00 UTC boundary (plus a grace period)
//! and closes out the week that just ended. Runs until `cancel` is
//! triggered.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::orchestrator::CloseoutOrchestrator;
use super::types::{CloseoutReport, WeekMode};
use crate::squads::week::{next_week_boundary, WeekWindow};
use crate::storage::CloseoutSettings;

/// Background driver for the weekly closeout.
pub struct CloseoutScheduler {
    orchestrator: Arc<CloseoutOrchestrator>,
    grace_period: Duration,
    catch_up_on_start: bool,
}

impl CloseoutScheduler {
    pub fn new(orchestrator: Arc<CloseoutOrchestrator>, settings: &CloseoutSettings) -> Self {
        Self {
            orchestrator,
            grace_period: settings.grace_period(),
            catch_up_on_start: settings.catch_up_on_start,
        }
    }

    /// Run the scheduling loop until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            grace_secs = self.grace_period.as_secs(),
            catch_up = self.catch_up_on_start,
            "Closeout scheduler started"
        );

        if self.catch_up_on_start && !cancel.is_cancelled() {
            self.run_once(Utc::now()).await;
        }

        loop {
            let now = Utc::now();
            let next = next_run_at(now, self.grace_period);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(next_run = %next, wait_secs = wait.as_secs(), "Next weekly closeout scheduled");

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Closeout scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    // The monotonic sleep can end a hair before the wall clock
                    // reaches the boundary
                    self.run_once(Utc::now().max(next)).await;
                }
            }
        }
    }

    /// Close out the previous week once, logging the outcome.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Option<CloseoutReport> {
        match self.orchestrator.run_closeout(WeekMode::Previous, now).await {
            Ok(report) => {
                if !report.is_success() {
                    tracing::warn!(
                        failed = report.failed.len(),
                        "Scheduled closeout left squads open, next run will retry"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled closeout could not start");
                None
            }
        }
    }
}

/// Next instant the weekly closeout should fire after `now`.
pub fn next_run_at(now: DateTime<Utc>, grace: Duration) -> DateTime<Utc> {
    let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());
    let this_week = WeekWindow::containing(now).start + grace;
    if now < this_week {
        this_week
    } else {
        next_week_boundary(now) + grace
    }
}
