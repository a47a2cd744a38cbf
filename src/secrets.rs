// ABOUTME: Read-only retrieval of static application secrets
// ABOUTME: Environment-backed implementation; fetched once per invocation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Secret retrieval.
//!
//! Static credentials (OAuth client id/secret, destination account
//! credentials) are read once per invocation and never written by this crate.
//! Rotating session material is a different concern and lives in
//! [`crate::store`].

use crate::errors::{SyncError, SyncResult};
use async_trait::async_trait;
use std::env;

/// Static application secrets required to talk to both providers
#[derive(Debug, Clone)]
pub struct StaticSecrets {
    /// Withings OAuth application client id
    pub withings_client_id: String,
    /// Withings OAuth application client secret
    pub withings_client_secret: String,
    /// Garmin Connect account email (used only by the external bootstrap)
    pub garmin_email: String,
    /// Garmin Connect account password (used only by the external bootstrap)
    pub garmin_password: String,
}

/// Read-only source of static secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch all static secrets. Called once per invocation.
    async fn fetch(&self) -> SyncResult<StaticSecrets>;
}

/// Secret store reading from process environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn required(name: &str) -> SyncResult<String> {
        env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::Config(format!("missing required secret {name}")))
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self) -> SyncResult<StaticSecrets> {
        Ok(StaticSecrets {
            withings_client_id: Self::required("WITHINGS_CLIENT_ID")?,
            withings_client_secret: Self::required("WITHINGS_CLIENT_SECRET")?,
            garmin_email: Self::required("GARMIN_EMAIL")?,
            garmin_password: Self::required("GARMIN_PASSWORD")?,
        })
    }
}
