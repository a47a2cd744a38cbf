// ABOUTME: Garmin Connect client covering session resume, weigh-in history, and uploads
// ABOUTME: Two-token session persisted as one JSON object; login is never attempted automatically
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Garmin Connect client.
//!
//! Garmin is the destination session manager, history fetcher, and uploader.
//! Its session is a two-token pair: a long-lived OAuth1-style token obtained
//! by the external interactive bootstrap, and a short-lived bearer token
//! exchanged from it. Session acquisition walks a small state machine:
//!
//! - stored session present → resume: refresh the bearer if stale, then make
//!   one cheap authenticated call to verify liveness
//! - resume rejected → the session is unusable; equivalent to no session
//! - no usable session → terminal. A fresh login can demand an interactive
//!   second factor, which a stateless invocation cannot answer, so the
//!   transition is never taken automatically and the run fails with
//!   `NeedsManualBootstrap`.
//!
//! Any bearer rotation observed during resume is written back to the session
//! store before `acquire_session` returns; a refreshed-but-unpersisted token
//! is lost on the next cold start.

use crate::errors::{SyncError, SyncResult};
use crate::models::{WeighIn, WeightMeasurement};
use crate::providers::WeightDestination;
use crate::store::{SessionStore, GARMIN_SESSION_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Provider name used in errors and logs
pub const PROVIDER: &str = "garmin";

const DEFAULT_API_BASE_URL: &str = "https://connectapi.garmin.com";

/// Refresh the bearer when it expires within this margin
const EXPIRY_MARGIN_MINUTES: i64 = 5;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Short-lived bearer token with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminOAuth2Token {
    /// Bearer token for API calls
    pub access_token: String,
    /// Optional refresh material returned by the exchange
    pub refresh_token: Option<String>,
    /// When the bearer expires
    pub expires_at: DateTime<Utc>,
}

/// The persisted Garmin session: both tokens plus bookkeeping.
///
/// Serialized as one complete JSON object under its store key; the persisted
/// copy is the source of truth across invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminSession {
    /// Long-lived token material from the interactive bootstrap
    pub oauth1_token: String,
    /// Short-lived bearer exchanged from the long-lived token
    pub oauth2: GarminOAuth2Token,
    /// When the bearer was last refreshed
    pub last_refreshed_at: DateTime<Utc>,
}

impl GarminSession {
    fn bearer_is_stale(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(EXPIRY_MARGIN_MINUTES) > self.oauth2.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeightRangeResponse {
    #[serde(default)]
    daily_weight_summaries: Vec<DailySummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailySummary {
    summary_date: String,
    #[serde(default)]
    all_weight_metrics: Vec<WeightMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeightMetric {
    /// Weight in grams
    weight: f64,
    /// Epoch milliseconds
    timestamp_gmt: Option<i64>,
}

/// Endpoint set, overridable for tests
#[derive(Debug, Clone)]
pub struct GarminEndpoints {
    /// Base URL for all Connect API calls
    pub api_base_url: String,
}

impl Default for GarminEndpoints {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
        }
    }
}

/// Garmin Connect API client
pub struct GarminClient {
    http: reqwest::Client,
    endpoints: GarminEndpoints,
    store: Arc<dyn SessionStore>,
    session: RwLock<Option<GarminSession>>,
}

impl GarminClient {
    /// Create a client with production endpoints
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(store: Arc<dyn SessionStore>) -> SyncResult<Self> {
        Self::with_endpoints(store, GarminEndpoints::default())
    }

    /// Create a client against custom endpoints
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn with_endpoints(
        store: Arc<dyn SessionStore>,
        endpoints: GarminEndpoints,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build {PROVIDER} HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoints,
            store,
            session: RwLock::new(None),
        })
    }

    /// Resume the persisted session, refreshing and re-persisting the bearer
    /// when stale, and verifying liveness with one cheap authenticated call.
    async fn acquire(&self) -> SyncResult<()> {
        let raw = self.store.get(GARMIN_SESSION_KEY).await?;

        let Some(raw) = raw else {
            // NoSession. A fresh login could require an interactive second
            // factor, so it is never attempted here.
            return Err(SyncError::NeedsManualBootstrap {
                provider: PROVIDER,
                reason: "no stored session; run the interactive bootstrap to seed one".into(),
            });
        };

        let mut session: GarminSession = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("malformed stored Garmin session: {e}")))?;

        let mut rotated = false;
        if session.bearer_is_stale(Utc::now()) {
            debug!("Garmin bearer stale, exchanging long-lived token");
            session = self.exchange_bearer(session).await?;
            rotated = true;
        }

        self.verify_liveness(&session).await?;

        if rotated {
            // Persist before the run proceeds; the execution environment may
            // discard all local state after this invocation.
            let serialized = serde_json::to_string(&session)
                .map_err(|e| SyncError::Store(format!("failed to serialize Garmin session: {e}")))?;
            self.store.put(GARMIN_SESSION_KEY, &serialized).await?;
            info!("Garmin session rotated and re-persisted");
        }

        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Exchange the long-lived token for a fresh bearer
    async fn exchange_bearer(&self, session: GarminSession) -> SyncResult<GarminSession> {
        let url = format!(
            "{}/oauth-service/oauth/exchange/user/2.0",
            self.endpoints.api_base_url
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("OAuth {}", session.oauth1_token))
            .send()
            .await
            .map_err(|e| SyncError::Network {
                provider: PROVIDER,
                source: e,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // The long-lived token itself is no longer honored; resume has
            // failed and only a fresh interactive login could recover.
            return Err(SyncError::NeedsManualBootstrap {
                provider: PROVIDER,
                reason: format!("stored session rejected during token exchange ({status})"),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail,
            });
        }

        let exchanged: ExchangeResponse =
            response.json().await.map_err(|e| SyncError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("exchange response: {e}"),
            })?;

        let now = Utc::now();
        Ok(GarminSession {
            oauth1_token: session.oauth1_token,
            oauth2: GarminOAuth2Token {
                access_token: exchanged.access_token,
                refresh_token: exchanged.refresh_token,
                expires_at: now + Duration::seconds(exchanged.expires_in),
            },
            last_refreshed_at: now,
        })
    }

    /// One cheap authenticated call proving the bearer is live
    async fn verify_liveness(&self, session: &GarminSession) -> SyncResult<()> {
        let url = format!(
            "{}/userprofile-service/socialProfile",
            self.endpoints.api_base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.oauth2.access_token)
            .send()
            .await
            .map_err(|e| SyncError::Network {
                provider: PROVIDER,
                source: e,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::NeedsManualBootstrap {
                provider: PROVIDER,
                reason: format!("stored session failed liveness verification ({status})"),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail,
            });
        }

        debug!("Garmin session verified live");
        Ok(())
    }

    async fn bearer_token(&self) -> SyncResult<String> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.oauth2.access_token.clone());
        }
        self.acquire().await?;
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.oauth2.access_token.clone())
            .ok_or_else(|| SyncError::Auth {
                provider: PROVIDER,
                reason: "session acquisition produced no bearer token".into(),
            })
    }

    fn convert_metric(summary_date: &str, metric: &WeightMetric) -> Option<WeighIn> {
        let taken_at = match metric.timestamp_gmt {
            Some(ms) => Utc.timestamp_millis_opt(ms).single()?,
            // Entries without a timestamp carry only the calendar date
            None => {
                let date = chrono::NaiveDate::parse_from_str(summary_date, "%Y-%m-%d").ok()?;
                date.and_hms_opt(0, 0, 0)?.and_utc()
            }
        };

        Some(WeighIn {
            taken_at,
            weight_kg: metric.weight / 1000.0,
        })
    }

    fn upload_payload(measurement: &WeightMeasurement) -> serde_json::Value {
        let timestamp = measurement
            .taken_at
            .format("%Y-%m-%dT%H:%M:%S%.3f")
            .to_string();
        let mut payload = json!({
            "dateTimestamp": timestamp,
            "gmtTimestamp": timestamp,
            "unitKey": "kg",
            "sourceType": "MANUAL",
            "value": measurement.weight_kg,
        });
        if let (Some(bmi), Some(map)) = (measurement.bmi, payload.as_object_mut()) {
            map.insert("bmi".to_owned(), json!(bmi));
        }
        payload
    }
}

#[async_trait]
impl WeightDestination for GarminClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn acquire_session(&self) -> SyncResult<()> {
        self.acquire().await
    }

    async fn recent_weigh_ins(&self, since: DateTime<Utc>) -> SyncResult<Vec<WeighIn>> {
        let token = self.bearer_token().await?;
        let until = Utc::now();

        let url = format!(
            "{}/weight-service/weight/range/{}/{}?includeAll=true",
            self.endpoints.api_base_url,
            since.format("%Y-%m-%d"),
            until.format("%Y-%m-%d"),
        );

        debug!(since = %since, "Fetching Garmin weigh-in history");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
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

        let range: WeightRangeResponse =
            response.json().await.map_err(|e| SyncError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("weight range response: {e}"),
            })?;

        let mut weigh_ins = Vec::new();
        for summary in &range.daily_weight_summaries {
            for metric in &summary.all_weight_metrics {
                if let Some(entry) = Self::convert_metric(&summary.summary_date, metric) {
                    weigh_ins.push(entry);
                } else {
                    warn!(
                        summary_date = %summary.summary_date,
                        "Skipping Garmin weigh-in with unparseable timestamp"
                    );
                }
            }
        }

        info!(count = weigh_ins.len(), "Retrieved Garmin weigh-in history");
        Ok(weigh_ins)
    }

    async fn upload(&self, measurement: &WeightMeasurement) -> SyncResult<String> {
        let token = self.bearer_token().await?;
        let url = format!("{}/weight-service/user-weight", self.endpoints.api_base_url);
        let payload = Self::upload_payload(measurement);

        info!(
            weight_kg = measurement.weight_kg,
            taken_at = %measurement.taken_at,
            "Uploading weigh-in to Garmin"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
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

        // The write endpoint often answers with an empty body; fall back to a
        // deterministic identifier derived from the measurement instant.
        let assigned = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(serde_json::Value::as_i64))
            .map_or_else(
                || format!("user-weight-{}", measurement.taken_at.timestamp()),
                |id| id.to_string(),
            );

        Ok(assigned)
    }
}
