// ABOUTME: Provider clients and the capability traits the orchestrator depends on
// ABOUTME: Withings is the measurement source, Garmin Connect the destination
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Provider layer.
//!
//! Two heterogeneous authentication schemes are unified behind one
//! acquisition contract: the orchestrator calls `acquire_session` and never
//! learns whether that meant an OAuth2 refresh-token exchange (Withings) or
//! a resume-verify-refresh dance over a two-token session (Garmin).
//!
//! The traits exist so orchestrator behavior is testable without network:
//! integration tests provide in-memory implementations.

use crate::errors::SyncResult;
use crate::models::{WeighIn, WeightMeasurement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Withings client: source session manager plus measurement fetcher
pub mod withings;

/// Garmin Connect client: destination session manager, history fetcher, uploader
pub mod garmin;

pub use garmin::GarminClient;
pub use withings::WithingsClient;

/// The measurement-originating provider
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Provider name for logging and error reporting
    fn name(&self) -> &'static str;

    /// Establish a usable session, persisting any rotated token material
    /// before returning. Failure is fatal for the run.
    async fn acquire_session(&self) -> SyncResult<()>;

    /// Fetch measurements in `[start, end]`, ordered by timestamp ascending
    async fn measurements(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<Vec<WeightMeasurement>>;
}

/// The provider receiving synced records
#[async_trait]
pub trait WeightDestination: Send + Sync {
    /// Provider name for logging and error reporting
    fn name(&self) -> &'static str;

    /// Establish a usable session, persisting any rotated token material
    /// before returning. Failure is fatal for the run.
    async fn acquire_session(&self) -> SyncResult<()>;

    /// Fetch existing weigh-ins since `since`, for duplicate comparison
    async fn recent_weigh_ins(&self, since: DateTime<Utc>) -> SyncResult<Vec<WeighIn>>;

    /// Write one record; returns the destination-assigned identifier.
    /// A failure here must not block sibling uploads in the same run.
    async fn upload(&self, measurement: &WeightMeasurement) -> SyncResult<String>;
}
