// ABOUTME: Environment-only configuration for the sync pipeline
// ABOUTME: Tolerances, safety cap, lookback, and transport settings
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Runtime configuration.
//!
//! Loaded once per process from environment variables; immutable afterwards.
//! Every knob has a default tuned for the single-account, handful-of-events-
//! per-day workload this service exists for.

use crate::errors::{SyncError, SyncResult};
use crate::models::TolerancePolicy;
use chrono::Duration;
use std::env;
use std::path::PathBuf;

/// Default timestamp tolerance for duplicate detection, in seconds
pub const DEFAULT_TIME_TOLERANCE_SECS: i64 = 120;

/// Default weight tolerance for duplicate detection, in kilograms
pub const DEFAULT_WEIGHT_TOLERANCE_KG: f64 = 0.1;

/// Default safety cap on records written per run
pub const DEFAULT_MAX_PER_RUN: usize = 5;

/// Default destination history lookback, in days
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Default candidate window for manual and unbounded webhook triggers, in days
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Process-wide configuration, loaded once and immutable
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timestamp tolerance for duplicate detection
    pub time_tolerance_secs: i64,
    /// Weight tolerance for duplicate detection, kilograms
    pub weight_tolerance_kg: f64,
    /// Maximum records written per run
    pub max_per_run: usize,
    /// Destination history lookback in days
    pub lookback_days: i64,
    /// Default candidate window in days
    pub default_window_days: i64,
    /// Path of the JSON session store document
    pub session_store_path: PathBuf,
    /// Port the HTTP glue binary listens on
    pub http_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            time_tolerance_secs: DEFAULT_TIME_TOLERANCE_SECS,
            weight_tolerance_kg: DEFAULT_WEIGHT_TOLERANCE_KG,
            max_per_run: DEFAULT_MAX_PER_RUN,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            default_window_days: DEFAULT_WINDOW_DAYS,
            session_store_path: PathBuf::from("sessions.json"),
            http_port: 8080,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when a set variable does not parse.
    pub fn from_env() -> SyncResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            time_tolerance_secs: parse_var("SYNC_TIME_TOLERANCE_SECS", defaults.time_tolerance_secs)?,
            weight_tolerance_kg: parse_var("SYNC_WEIGHT_TOLERANCE_KG", defaults.weight_tolerance_kg)?,
            max_per_run: parse_var("SYNC_MAX_PER_RUN", defaults.max_per_run)?,
            lookback_days: parse_var("SYNC_LOOKBACK_DAYS", defaults.lookback_days)?,
            default_window_days: parse_var("SYNC_WINDOW_DAYS", defaults.default_window_days)?,
            session_store_path: env::var("SESSION_STORE_PATH")
                .map_or(defaults.session_store_path, PathBuf::from),
            http_port: parse_var("PORT", defaults.http_port)?,
        })
    }

    /// Tolerance policy derived from this configuration
    #[must_use]
    pub fn tolerance(&self) -> TolerancePolicy {
        TolerancePolicy {
            time_tolerance: Duration::seconds(self.time_tolerance_secs),
            weight_tolerance_kg: self.weight_tolerance_kg,
        }
    }

    /// Destination history lookback as a duration
    #[must_use]
    pub fn lookback(&self) -> Duration {
        Duration::days(self.lookback_days)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> SyncResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| SyncError::Config(format!("invalid {name}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_env_unset() {
        for name in [
            "SYNC_TIME_TOLERANCE_SECS",
            "SYNC_WEIGHT_TOLERANCE_KG",
            "SYNC_MAX_PER_RUN",
            "SYNC_LOOKBACK_DAYS",
            "SYNC_WINDOW_DAYS",
            "SESSION_STORE_PATH",
            "PORT",
        ] {
            std::env::remove_var(name);
        }

        let config = SyncConfig::from_env().unwrap();
        assert_eq!(config.max_per_run, DEFAULT_MAX_PER_RUN);
        assert_eq!(config.lookback_days, DEFAULT_LOOKBACK_DAYS);
        assert_eq!(config.tolerance().time_tolerance, Duration::seconds(120));
    }

    #[test]
    #[serial]
    fn malformed_value_is_a_config_error() {
        std::env::set_var("SYNC_MAX_PER_RUN", "not-a-number");
        let result = SyncConfig::from_env();
        std::env::remove_var("SYNC_MAX_PER_RUN");

        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    #[serial]
    fn overrides_are_read() {
        std::env::set_var("SYNC_MAX_PER_RUN", "3");
        std::env::set_var("SYNC_LOOKBACK_DAYS", "14");
        let config = SyncConfig::from_env().unwrap();
        std::env::remove_var("SYNC_MAX_PER_RUN");
        std::env::remove_var("SYNC_LOOKBACK_DAYS");

        assert_eq!(config.max_per_run, 3);
        assert_eq!(config.lookback_days, 14);
    }
}
