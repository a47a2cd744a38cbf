// ABOUTME: Sync orchestrator composing session acquisition, fetch, dedup, cap, and upload
// ABOUTME: One reconciliation run per trigger; per-record upload failure isolation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Sync orchestration.
//!
//! One [`SyncOrchestrator::run`] per trigger. The sequence is fixed:
//! acquire both sessions, fetch candidates for the trigger's window, fetch
//! destination history over the lookback window, deduplicate, cap, upload
//! each accepted record collecting per-record outcomes.
//!
//! Failure boundaries: a session-acquisition or fetch error aborts the run
//! before anything is written; an upload error is recorded for that record
//! and does not block its siblings. Rotated session material is persisted by
//! the session managers during acquisition, so by the time uploads start the
//! store already reflects any rotation.
//!
//! Nothing here retries. Retry-by-redelivery (webhook) and
//! retry-by-reinvocation (manual) are the external recovery mechanisms, made
//! safe because deduplication renders repeated runs idempotent in effect.

use crate::config::SyncConfig;
use crate::models::{
    RunResult, SkipReason, SkippedMeasurement, TolerancePolicy, Trigger, WeightMeasurement,
};
use crate::providers::{MeasurementSource, WeightDestination};
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

/// Pure duplicate detection
pub mod dedup;

/// Split `accepted` at the per-run cap, preserving order.
///
/// Returns `(kept, overflow)` where `kept` holds at most `max` entries.
/// Because the fetcher orders candidates by timestamp ascending, the oldest
/// pending measurements are written first across repeated runs when a
/// backlog exceeds the cap.
#[must_use]
pub fn limit<T>(mut accepted: Vec<T>, max: usize) -> (Vec<T>, Vec<T>) {
    if accepted.len() <= max {
        return (accepted, Vec::new());
    }
    let overflow = accepted.split_off(max);
    (accepted, overflow)
}

/// Composes the pipeline into one reconciliation run per trigger.
///
/// Depends only on the [`MeasurementSource`] and [`WeightDestination`]
/// capability traits, never on provider-specific session shape.
pub struct SyncOrchestrator<S, D> {
    source: S,
    destination: D,
    policy: TolerancePolicy,
    max_per_run: usize,
    lookback: Duration,
    default_window_days: i64,
}

impl<S, D> SyncOrchestrator<S, D>
where
    S: MeasurementSource,
    D: WeightDestination,
{
    /// Build an orchestrator from loaded configuration
    #[must_use]
    pub fn new(source: S, destination: D, config: &SyncConfig) -> Self {
        Self {
            source,
            destination,
            policy: config.tolerance(),
            max_per_run: config.max_per_run,
            lookback: config.lookback(),
            default_window_days: config.default_window_days,
        }
    }

    /// Execute one reconciliation run.
    ///
    /// # Errors
    ///
    /// Returns an error when session acquisition or either fetch fails —
    /// always before any record has been written. Upload failures do not
    /// produce an `Err`; they are reported per record in the [`RunResult`].
    pub async fn run(&self, trigger: Trigger) -> crate::errors::SyncResult<RunResult> {
        let now = Utc::now();
        info!(trigger = trigger.kind(), "Starting sync run");

        // Both sessions up front: a run that cannot authenticate must abort
        // before any destructive half-state.
        self.source.acquire_session().await?;
        self.destination.acquire_session().await?;

        let (start, end) = trigger.window(now, self.default_window_days);
        let candidates = self.source.measurements(start, end).await?;

        if candidates.is_empty() {
            info!("No new measurements found at source");
            return Ok(RunResult {
                accepted: 0,
                skipped: Vec::new(),
                errors: Vec::new(),
                message: "No new measurements".into(),
            });
        }

        info!(count = candidates.len(), "Found candidate measurements");

        let history = self.destination.recent_weigh_ins(now - self.lookback).await?;
        info!(count = history.len(), "Found existing destination entries");

        let total_candidates = candidates.len();
        let (fresh, duplicates) = dedup::partition_duplicates(candidates, &history, &self.policy);

        let mut skipped: Vec<SkippedMeasurement> = duplicates
            .iter()
            .map(|m| skip(m, SkipReason::Duplicate))
            .collect();

        if fresh.is_empty() {
            info!(
                skipped = skipped.len(),
                "All measurements already exist at destination"
            );
            return Ok(RunResult {
                accepted: 0,
                skipped,
                errors: Vec::new(),
                message: "All measurements already synced".into(),
            });
        }

        let (to_upload, overflow) = limit(fresh, self.max_per_run);
        if !overflow.is_empty() {
            warn!(
                pending = overflow.len(),
                cap = self.max_per_run,
                "Safety cap reached; remaining measurements deferred to a later run"
            );
            skipped.extend(overflow.iter().map(|m| skip(m, SkipReason::OverCap)));
        }

        let mut accepted = 0;
        let mut errors = Vec::new();
        for measurement in &to_upload {
            match self.destination.upload(measurement).await {
                Ok(destination_id) => {
                    accepted += 1;
                    info!(
                        destination_id = %destination_id,
                        weight_kg = measurement.weight_kg,
                        taken_at = %measurement.taken_at,
                        "Synced measurement"
                    );
                }
                Err(e) => {
                    // One rejected record must not block its siblings
                    error!(
                        taken_at = %measurement.taken_at,
                        error = %e,
                        "Failed to sync measurement"
                    );
                    skipped.push(skip(measurement, SkipReason::UploadFailed));
                    errors.push(e.to_string());
                }
            }
        }

        let message = format!(
            "Synced {accepted} of {total_candidates} measurements ({} skipped)",
            skipped.len()
        );
        info!(accepted, skipped = skipped.len(), "Sync run complete");

        Ok(RunResult {
            accepted,
            skipped,
            errors,
            message,
        })
    }
}

fn skip(measurement: &WeightMeasurement, reason: SkipReason) -> SkippedMeasurement {
    SkippedMeasurement {
        taken_at: measurement.taken_at,
        weight_kg: measurement.weight_kg,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_a_noop_under_the_cap() {
        let (kept, overflow) = limit(vec![1, 2, 3], 5);
        assert_eq!(kept, vec![1, 2, 3]);
        assert!(overflow.is_empty());
    }

    #[test]
    fn limit_truncates_preserving_order() {
        let (kept, overflow) = limit(vec![1, 2, 3, 4, 5, 6, 7, 8], 5);
        assert_eq!(kept, vec![1, 2, 3, 4, 5]);
        assert_eq!(overflow, vec![6, 7, 8]);
    }

    #[test]
    fn limit_of_zero_keeps_nothing() {
        let (kept, overflow) = limit(vec![1, 2], 0);
        assert!(kept.is_empty());
        assert_eq!(overflow, vec![1, 2]);
    }
}
