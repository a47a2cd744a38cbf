// ABOUTME: Structured error types for the sync pipeline
// ABOUTME: Distinguishes fatal auth failures from per-record upstream failures
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Error handling for the sync pipeline.
//!
//! Every failure a run can hit maps to one of these variants. The split
//! matters operationally:
//!
//! - [`SyncError::Auth`] and [`SyncError::NeedsManualBootstrap`] are fatal for
//!   the run and require operator action (re-authorize the provider).
//! - [`SyncError::Upstream`] / [`SyncError::Network`] abort the run when hit
//!   during session acquisition or fetching, but are recorded per record and
//!   swallowed when hit during upload.
//! - [`SyncError::Config`] and [`SyncError::Store`] are fatal and never
//!   retried within a run.

use thiserror::Error;

/// Unified error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Provider rejected our credentials (expired refresh token, revoked
    /// session). Non-retryable within a run; requires re-authorization.
    #[error("{provider} authentication failed: {reason}")]
    Auth {
        /// Provider that rejected the credentials
        provider: &'static str,
        /// Why authentication failed
        reason: String,
    },

    /// No usable session exists and obtaining one would require an
    /// interactive login (possibly with a second factor), which a stateless
    /// invocation cannot perform. Reported distinctly from transient
    /// upstream failures so operators know to run the bootstrap procedure.
    #[error("{provider} session requires manual bootstrap: {reason}")]
    NeedsManualBootstrap {
        /// Provider whose session is missing
        provider: &'static str,
        /// What is missing or unusable
        reason: String,
    },

    /// Provider data endpoint returned a non-success response
    #[error("{provider} request failed with status {status}: {detail}")]
    Upstream {
        /// Provider that returned the failure
        provider: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body or description
        detail: String,
    },

    /// Transport-level failure (connection, timeout, TLS)
    #[error("{provider} request could not be completed")]
    Network {
        /// Provider we were talking to
        provider: &'static str,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Provider responded 2xx but the payload did not parse as expected
    #[error("{provider} returned an unexpected payload: {detail}")]
    InvalidResponse {
        /// Provider that returned the payload
        provider: &'static str,
        /// What failed to parse
        detail: String,
    },

    /// Missing or malformed secrets, settings, or persisted session data
    #[error("configuration error: {0}")]
    Config(String),

    /// Session store read or write failed
    #[error("session store error: {0}")]
    Store(String),
}

impl SyncError {
    /// Whether this error means credentials must be re-established by a human
    /// before any future run can succeed.
    #[must_use]
    pub const fn requires_operator_action(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::NeedsManualBootstrap { .. } | Self::Config(_)
        )
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
