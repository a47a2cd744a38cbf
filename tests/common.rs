// ABOUTME: Shared test utilities for scale-sync integration tests
// ABOUTME: Quiet logging setup and domain object builders
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(dead_code)]

//! Shared test utilities for `scale_sync` integration tests.

use chrono::{DateTime, TimeZone, Utc};
use scale_sync::config::SyncConfig;
use scale_sync::models::{WeighIn, WeightMeasurement};
use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// A fixed instant all relative test timestamps hang off
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 19, 12, 0, 0).single().unwrap()
}

/// Build a measurement offset from `base_time` by whole minutes
pub fn measurement(minutes_after_base: i64, weight_kg: f64) -> WeightMeasurement {
    let taken_at = base_time() + chrono::Duration::minutes(minutes_after_base);
    WeightMeasurement {
        taken_at,
        weight_kg,
        source_id: format!("grp-{minutes_after_base}"),
        bmi: None,
        fat_ratio: None,
    }
}

/// Build a destination history entry offset from `base_time` by whole minutes
pub fn weigh_in(minutes_after_base: i64, weight_kg: f64) -> WeighIn {
    WeighIn {
        taken_at: base_time() + chrono::Duration::minutes(minutes_after_base),
        weight_kg,
    }
}

/// Default test configuration (tolerances 120 s / 0.1 kg, cap 5)
pub fn test_config() -> SyncConfig {
    SyncConfig::default()
}
