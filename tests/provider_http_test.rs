// ABOUTME: HTTP-level tests for the Withings and Garmin clients against a stub server
// ABOUTME: Covers token rotation persistence, session exchange, and the upload payload
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

mod common;

use chrono::{Duration, Utc};
use common::{init_test_logging, measurement};
use scale_sync::errors::SyncError;
use scale_sync::models::Trigger;
use scale_sync::providers::garmin::{GarminEndpoints, GarminOAuth2Token, GarminSession};
use scale_sync::providers::withings::WithingsEndpoints;
use scale_sync::providers::{GarminClient, MeasurementSource, WeightDestination, WithingsClient};
use scale_sync::store::{
    MemorySessionStore, SessionStore, GARMIN_SESSION_KEY, WITHINGS_REFRESH_TOKEN_KEY,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn withings_endpoints(server: &MockServer) -> WithingsEndpoints {
    WithingsEndpoints {
        token_url: format!("{}/v2/oauth2", server.uri()),
        measure_url: format!("{}/measure", server.uri()),
        notify_url: format!("{}/notify", server.uri()),
    }
}

fn seeded_store(key: &str, value: &str) -> Arc<dyn SessionStore> {
    let mut entries = HashMap::new();
    entries.insert(key.to_string(), value.to_string());
    Arc::new(MemorySessionStore::with_entries(entries))
}

fn garmin_session(expires_at: chrono::DateTime<Utc>) -> String {
    serde_json::to_string(&GarminSession {
        oauth1_token: "oauth1-material".into(),
        oauth2: GarminOAuth2Token {
            access_token: "stored-bearer".into(),
            refresh_token: None,
            expires_at,
        },
        last_refreshed_at: Utc::now(),
    })
    .unwrap()
}

#[tokio::test]
async fn withings_acquire_persists_the_rotated_refresh_token() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": {
                "access_token": "fresh-access",
                "refresh_token": "rotated-refresh",
                "expires_in": 10_800,
            }
        })))
        .mount(&server)
        .await;

    let store = seeded_store(WITHINGS_REFRESH_TOKEN_KEY, "old-refresh");
    let client = WithingsClient::with_endpoints(
        Arc::clone(&store),
        "client-id".into(),
        "client-secret".into(),
        withings_endpoints(&server),
    )
    .unwrap();

    client.acquire_session().await.unwrap();

    assert_eq!(
        store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("rotated-refresh")
    );
}

#[tokio::test]
async fn withings_rejected_refresh_token_is_a_fatal_auth_error() {
    init_test_logging();
    let server = MockServer::start().await;

    // Withings answers HTTP 200 even on failure; the envelope carries the
    // real status.
    Mock::given(method("POST"))
        .and(path("/v2/oauth2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 401,
            "error": "invalid refresh token",
        })))
        .mount(&server)
        .await;

    let store = seeded_store(WITHINGS_REFRESH_TOKEN_KEY, "revoked-refresh");
    let client = WithingsClient::with_endpoints(
        store,
        "client-id".into(),
        "client-secret".into(),
        withings_endpoints(&server),
    )
    .unwrap();

    let err = client.acquire_session().await.unwrap_err();
    assert!(matches!(err, SyncError::Auth { .. }));
    assert!(err.requires_operator_action());
}

#[tokio::test]
async fn withings_measurements_decode_and_sort_ascending() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": {
                "access_token": "fresh-access",
                "refresh_token": "rotated-refresh",
                "expires_in": 10_800,
            }
        })))
        .mount(&server)
        .await;

    // Groups arrive newest first; the fetcher must sort ascending
    Mock::given(method("POST"))
        .and(path("/measure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": {
                "measuregrps": [
                    {
                        "grpid": 2,
                        "date": 1_768_824_000,
                        "measures": [{ "value": 70_500, "type": 1, "unit": -3 }]
                    },
                    {
                        "grpid": 1,
                        "date": 1_768_820_400,
                        "measures": [{ "value": 70_200, "type": 1, "unit": -3 }]
                    }
                ]
            }
        })))
        .mount(&server)
        .await;

    let store = seeded_store(WITHINGS_REFRESH_TOKEN_KEY, "old-refresh");
    let client = WithingsClient::with_endpoints(
        store,
        "client-id".into(),
        "client-secret".into(),
        withings_endpoints(&server),
    )
    .unwrap();

    let now = Utc::now();
    let fetched = client.measurements(now - Duration::days(7), now).await.unwrap();

    assert_eq!(fetched.len(), 2);
    assert!(fetched[0].taken_at < fetched[1].taken_at);
    assert!((fetched[0].weight_kg - 70.2).abs() < 1e-9);
    assert_eq!(fetched[0].source_id, "1");
}

#[tokio::test]
async fn garmin_upload_round_trips_through_a_live_session() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/weight-service/user-weight"))
        .and(body_partial_json(json!({
            "unitKey": "kg",
            "sourceType": "MANUAL",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 4242 })))
        .mount(&server)
        .await;

    let store = seeded_store(
        GARMIN_SESSION_KEY,
        &garmin_session(Utc::now() + Duration::hours(2)),
    );
    let client = GarminClient::with_endpoints(
        store,
        GarminEndpoints {
            api_base_url: server.uri(),
        },
    )
    .unwrap();

    client.acquire_session().await.unwrap();
    let assigned = client.upload(&measurement(0, 70.2)).await.unwrap();
    assert_eq!(assigned, "4242");
}

#[tokio::test]
async fn garmin_stale_bearer_is_exchanged_and_repersisted() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth-service/oauth/exchange/user/2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let store = seeded_store(
        GARMIN_SESSION_KEY,
        &garmin_session(Utc::now() - Duration::hours(1)),
    );
    let client = GarminClient::with_endpoints(
        Arc::clone(&store),
        GarminEndpoints {
            api_base_url: server.uri(),
        },
    )
    .unwrap();

    client.acquire_session().await.unwrap();

    // The rotated session must already be durable
    let raw = store.get(GARMIN_SESSION_KEY).await.unwrap().unwrap();
    let persisted: GarminSession = serde_json::from_str(&raw).unwrap();
    assert_eq!(persisted.oauth2.access_token, "fresh-bearer");
    assert_eq!(persisted.oauth1_token, "oauth1-material");
}

#[tokio::test]
async fn garmin_rejected_exchange_requires_manual_bootstrap() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth-service/oauth/exchange/user/2.0"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = seeded_store(
        GARMIN_SESSION_KEY,
        &garmin_session(Utc::now() - Duration::hours(1)),
    );
    let client = GarminClient::with_endpoints(
        store,
        GarminEndpoints {
            api_base_url: server.uri(),
        },
    )
    .unwrap();

    let err = client.acquire_session().await.unwrap_err();
    assert!(matches!(err, SyncError::NeedsManualBootstrap { .. }));
}

// The glue binary wires real clients into the orchestrator; keep the trigger
// type exercised from this crate boundary as well.
#[tokio::test]
async fn manual_trigger_window_feeds_the_measure_request() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": {
                "access_token": "fresh-access",
                "refresh_token": "rotated-refresh",
                "expires_in": 10_800,
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/measure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": { "measuregrps": [] }
        })))
        .mount(&server)
        .await;

    let store = seeded_store(WITHINGS_REFRESH_TOKEN_KEY, "old-refresh");
    let client = WithingsClient::with_endpoints(
        store,
        "client-id".into(),
        "client-secret".into(),
        withings_endpoints(&server),
    )
    .unwrap();

    let (start, end) = Trigger::Manual { days: Some(3) }.window(Utc::now(), 7);
    let fetched = client.measurements(start, end).await.unwrap();
    assert!(fetched.is_empty());
}
