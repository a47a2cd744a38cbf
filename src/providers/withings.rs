// ABOUTME: Withings API client covering refresh-token auth and measurement retrieval
// ABOUTME: Persists rotated refresh tokens and decodes the mantissa weight encoding
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Withings client.
//!
//! Withings is the source session manager and measurement fetcher. Session
//! acquisition is a pure refresh-token exchange: the stored refresh token is
//! swapped for a short-lived access token, and the rotated refresh token is
//! persisted before `acquire_session` returns — losing a rotation would
//! invalidate every future refresh. There is no interactive fallback; a
//! rejected refresh token is surfaced as a fatal auth error and requires the
//! external re-authorization procedure.
//!
//! The Withings API wraps every response in a JSON envelope with its own
//! `status` field and returns HTTP 200 even for failures, so both layers are
//! checked here.

use crate::errors::{SyncError, SyncResult};
use crate::models::WeightMeasurement;
use crate::providers::MeasurementSource;
use crate::store::{SessionStore, WITHINGS_REFRESH_TOKEN_KEY};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Provider name used in errors and logs
pub const PROVIDER: &str = "withings";

const DEFAULT_TOKEN_URL: &str = "https://wbsapi.withings.net/v2/oauth2";
const DEFAULT_MEASURE_URL: &str = "https://wbsapi.withings.net/measure";
const DEFAULT_NOTIFY_URL: &str = "https://wbsapi.withings.net/notify";

/// Withings measurement type for weight
const MEASTYPE_WEIGHT: i64 = 1;
/// Withings measurement type for fat ratio (percent)
const MEASTYPE_FAT_RATIO: i64 = 6;
/// Withings notification category for weight events
const APPLI_WEIGHT: i64 = 1;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Every Withings response carries its own status code; zero means success
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: i64,
    error: Option<String>,
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MeasureBody {
    measuregrps: Vec<MeasureGroup>,
}

#[derive(Debug, Deserialize)]
struct MeasureGroup {
    grpid: i64,
    date: i64,
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: i64,
    #[serde(rename = "type")]
    kind: i64,
    unit: i32,
}

#[derive(Debug, Deserialize)]
struct NotifyListBody {
    #[serde(default)]
    profiles: Vec<NotifyProfile>,
}

/// One active notification subscription
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyProfile {
    /// Notification category (1 = weight)
    pub appli: i64,
    /// Callback URL the subscription delivers to
    pub callbackurl: String,
    /// Optional operator comment attached at subscribe time
    pub comment: Option<String>,
}

/// Endpoint set, overridable for tests
#[derive(Debug, Clone)]
pub struct WithingsEndpoints {
    /// OAuth2 token endpoint
    pub token_url: String,
    /// Measurement query endpoint
    pub measure_url: String,
    /// Notification subscription endpoint
    pub notify_url: String,
}

impl Default for WithingsEndpoints {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_owned(),
            measure_url: DEFAULT_MEASURE_URL.to_owned(),
            notify_url: DEFAULT_NOTIFY_URL.to_owned(),
        }
    }
}

/// Withings API client
pub struct WithingsClient {
    http: reqwest::Client,
    endpoints: WithingsEndpoints,
    store: Arc<dyn SessionStore>,
    client_id: String,
    client_secret: String,
    access_token: RwLock<Option<String>>,
}

impl WithingsClient {
    /// Create a client with production endpoints
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        store: Arc<dyn SessionStore>,
        client_id: String,
        client_secret: String,
    ) -> SyncResult<Self> {
        Self::with_endpoints(store, client_id, client_secret, WithingsEndpoints::default())
    }

    /// Create a client against custom endpoints
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn with_endpoints(
        store: Arc<dyn SessionStore>,
        client_id: String,
        client_secret: String,
        endpoints: WithingsEndpoints,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build {PROVIDER} HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoints,
            store,
            client_id,
            client_secret,
            access_token: RwLock::new(None),
        })
    }

    async fn bearer_token(&self) -> SyncResult<String> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.acquire().await?;
        self.access_token
            .read()
            .await
            .clone()
            .ok_or_else(|| SyncError::Auth {
                provider: PROVIDER,
                reason: "token exchange produced no access token".into(),
            })
    }

    /// Exchange the stored refresh token for a fresh access token,
    /// persisting the rotated refresh token before returning.
    async fn acquire(&self) -> SyncResult<()> {
        let stored = self
            .store
            .get(WITHINGS_REFRESH_TOKEN_KEY)
            .await?
            .ok_or_else(|| SyncError::Config(
                "no Withings refresh token in session store; complete the authorization flow and seed the store".into(),
            ))?;

        debug!("Exchanging Withings refresh token for access token");

        let form = [
            ("action", "requesttoken"),
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", stored.as_str()),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SyncError::Network {
                provider: PROVIDER,
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail,
            });
        }

        let envelope: Envelope<TokenBody> =
            response.json().await.map_err(|e| SyncError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("token response: {e}"),
            })?;

        if envelope.status != 0 {
            // Non-zero status on the token endpoint means the refresh token
            // was rejected; this run cannot proceed.
            return Err(SyncError::Auth {
                provider: PROVIDER,
                reason: format!(
                    "refresh token rejected (api status {}): {}",
                    envelope.status,
                    envelope.error.unwrap_or_default()
                ),
            });
        }

        let body = envelope.body.ok_or_else(|| SyncError::InvalidResponse {
            provider: PROVIDER,
            detail: "token response missing body".into(),
        })?;

        if body.refresh_token != stored {
            info!("Withings refresh token rotated, persisting before use");
        }
        // Rotation must hit the store before this call returns; a dropped
        // rotation invalidates all future refreshes.
        self.store
            .put(WITHINGS_REFRESH_TOKEN_KEY, &body.refresh_token)
            .await?;

        debug!(
            expires_in = body.expires_in.unwrap_or_default(),
            "Withings access token acquired"
        );
        *self.access_token.write().await = Some(body.access_token);
        Ok(())
    }

    async fn api_request<T>(&self, url: &str, form: &[(&str, String)]) -> SyncResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.bearer_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .map_err(|e| SyncError::Network {
                provider: PROVIDER,
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail,
            });
        }

        let envelope: Envelope<T> =
            response.json().await.map_err(|e| SyncError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("api response: {e}"),
            })?;

        if envelope.status != 0 {
            return Err(SyncError::Upstream {
                provider: PROVIDER,
                status: u16::try_from(envelope.status).unwrap_or(0),
                detail: envelope.error.unwrap_or_else(|| "api error".into()),
            });
        }

        envelope.body.ok_or_else(|| SyncError::InvalidResponse {
            provider: PROVIDER,
            detail: "response missing body".into(),
        })
    }

    /// Subscribe this application to weight notifications at `callback_url`
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription request fails.
    pub async fn notify_subscribe(&self, callback_url: &str) -> SyncResult<()> {
        info!(callback_url, "Subscribing to Withings weight notifications");
        let form = [
            ("action", "subscribe".to_owned()),
            ("callbackurl", callback_url.to_owned()),
            ("appli", APPLI_WEIGHT.to_string()),
        ];
        self.api_request::<serde_json::Value>(&self.endpoints.notify_url, &form)
            .await?;
        Ok(())
    }

    /// List active weight notification subscriptions
    ///
    /// # Errors
    ///
    /// Returns an error when the list request fails.
    pub async fn notify_list(&self) -> SyncResult<Vec<NotifyProfile>> {
        let form = [
            ("action", "list".to_owned()),
            ("appli", APPLI_WEIGHT.to_string()),
        ];
        let body: NotifyListBody = self
            .api_request(&self.endpoints.notify_url, &form)
            .await?;
        Ok(body.profiles)
    }

    /// Revoke the weight notification subscription for `callback_url`
    ///
    /// # Errors
    ///
    /// Returns an error when the revoke request fails.
    pub async fn notify_revoke(&self, callback_url: &str) -> SyncResult<()> {
        info!(callback_url, "Revoking Withings weight notification");
        let form = [
            ("action", "revoke".to_owned()),
            ("callbackurl", callback_url.to_owned()),
            ("appli", APPLI_WEIGHT.to_string()),
        ];
        self.api_request::<serde_json::Value>(&self.endpoints.notify_url, &form)
            .await?;
        Ok(())
    }

    fn convert_group(group: &MeasureGroup) -> Option<WeightMeasurement> {
        let taken_at = Utc.timestamp_opt(group.date, 0).single()?;

        let decode =
            |m: &Measure| -> f64 { m.value as f64 * 10f64.powi(m.unit) };

        let weight = group
            .measures
            .iter()
            .find(|m| m.kind == MEASTYPE_WEIGHT)
            .map(decode)?;
        let fat_ratio = group
            .measures
            .iter()
            .find(|m| m.kind == MEASTYPE_FAT_RATIO)
            .map(decode);

        Some(WeightMeasurement {
            taken_at,
            weight_kg: weight,
            source_id: group.grpid.to_string(),
            bmi: None,
            fat_ratio,
        })
    }
}

#[async_trait]
impl MeasurementSource for WithingsClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn acquire_session(&self) -> SyncResult<()> {
        self.acquire().await
    }

    async fn measurements(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<Vec<WeightMeasurement>> {
        debug!(
            start = %start,
            end = %end,
            "Fetching Withings measurements"
        );

        let form = [
            ("action", "getmeas".to_owned()),
            ("meastype", MEASTYPE_WEIGHT.to_string()),
            ("category", "1".to_owned()),
            ("startdate", start.timestamp().to_string()),
            ("enddate", end.timestamp().to_string()),
        ];

        let body: MeasureBody = self
            .api_request(&self.endpoints.measure_url, &form)
            .await?;

        let mut measurements: Vec<WeightMeasurement> = body
            .measuregrps
            .iter()
            .filter_map(|group| {
                let converted = Self::convert_group(group);
                if converted.is_none() {
                    warn!(grpid = group.grpid, "Skipping measure group without weight");
                }
                converted
            })
            .collect();

        measurements.sort_by_key(|m| m.taken_at);

        info!(count = measurements.len(), "Retrieved Withings measurements");
        Ok(measurements)
    }
}
