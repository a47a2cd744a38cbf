// ABOUTME: Core domain models for weight reconciliation runs
// ABOUTME: Measurements, triggers, run results, and tolerance policy
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Domain models shared across the pipeline.
//!
//! A [`WeightMeasurement`] is created by the source fetcher, compared by the
//! deduplicator, and consumed by the uploader. It is immutable once fetched
//! and has no existence beyond one run. [`RunResult`] is the ephemeral run
//! summary returned to the caller; nothing in here is ever persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single weight reading from the source provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightMeasurement {
    /// When the reading was taken (timezone-aware)
    pub taken_at: DateTime<Utc>,
    /// Weight in kilograms (canonical unit)
    pub weight_kg: f64,
    /// Opaque provider-assigned identifier for the measurement group
    pub source_id: String,
    /// Body mass index, when the provider reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    /// Body fat percentage, when the provider reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_ratio: Option<f64>,
}

/// An existing weigh-in already present at the destination, used only as
/// comparison input for duplicate detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeighIn {
    /// When the destination recorded the entry
    pub taken_at: DateTime<Utc>,
    /// Weight in kilograms
    pub weight_kg: f64,
}

/// What started this sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A provider push notification, carrying the range it announced.
    /// Bounds are optional because notifications can arrive without them.
    Webhook {
        /// Notification start bound (epoch-derived)
        start: Option<DateTime<Utc>>,
        /// Notification end bound
        end: Option<DateTime<Utc>>,
    },
    /// An on-demand request, optionally overriding the lookback in days
    Manual {
        /// Days to look back; `None` uses the configured default
        days: Option<i64>,
    },
}

impl Trigger {
    /// Short label for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::Manual { .. } => "manual",
        }
    }

    /// Resolve the candidate fetch window for this trigger.
    ///
    /// Webhook triggers use the bounds the notification carried; missing
    /// bounds fall back to the default window ending now. Manual triggers
    /// look back `days` (or the default) from now.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>, default_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::Webhook { start, end } => {
                let end = end.unwrap_or(now);
                let start = start.unwrap_or_else(|| end - Duration::days(default_days));
                (start, end)
            }
            Self::Manual { days } => {
                let span = Duration::days(days.unwrap_or(default_days));
                (now - span, now)
            }
        }
    }
}

/// Why a candidate measurement was not uploaded in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A matching entry already exists at the destination
    Duplicate,
    /// The per-run safety cap was reached; a later run will pick it up
    OverCap,
    /// The destination rejected the upload for this record
    UploadFailed,
}

/// A candidate that was skipped, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedMeasurement {
    /// When the skipped reading was taken
    pub taken_at: DateTime<Utc>,
    /// Weight of the skipped reading
    pub weight_kg: f64,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Summary of one reconciliation run, returned to the trigger transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Records successfully written to the destination
    pub accepted: usize,
    /// Candidates not written this run, with reasons
    pub skipped: Vec<SkippedMeasurement>,
    /// Per-record upload errors (empty for a clean run)
    pub errors: Vec<String>,
    /// Human-readable outcome summary
    pub message: String,
}

impl RunResult {
    /// Count of skipped candidates
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Tolerances under which a candidate and an existing entry are considered
/// the same physical weigh-in.
///
/// Both conditions must hold simultaneously; they are evaluated
/// independently, never combined into a distance metric.
#[derive(Debug, Clone, Copy)]
pub struct TolerancePolicy {
    /// Maximum timestamp delta
    pub time_tolerance: Duration,
    /// Maximum weight delta in kilograms (accounts for provider rounding)
    pub weight_tolerance_kg: f64,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            time_tolerance: Duration::seconds(120),
            weight_tolerance_kg: 0.1,
        }
    }
}
