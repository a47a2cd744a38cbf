// ABOUTME: HTTP entry point translating webhook and manual triggers into sync runs
// ABOUTME: Thin axum glue; all reconciliation logic lives in the library
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # scale-sync server binary
//!
//! Exposes the three routes the original deployment serves:
//!
//! - `GET /health` — liveness probe
//! - `HEAD|GET|POST /webhook/withings` — HEAD/GET answer the Withings
//!   endpoint verification with an empty 200; POST carries the
//!   form-encoded measurement notification
//! - `POST /sync/manual?days=N` — on-demand sync over the last N days
//!
//! Every request builds the orchestrator from scratch: the process holds no
//! session state between invocations, matching the stateless deployment
//! model the library is designed for.

use anyhow::Result;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{TimeZone, Utc};
use clap::Parser;
use scale_sync::{
    config::SyncConfig,
    errors::SyncError,
    logging,
    models::{RunResult, Trigger},
    providers::{GarminClient, WithingsClient},
    secrets::{EnvSecretStore, SecretStore},
    store::{FileSessionStore, SessionStore},
    sync::SyncOrchestrator,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Withings notification category for weight events
const APPLI_WEIGHT: i64 = 1;

#[derive(Parser)]
#[command(name = "scale-sync-server")]
#[command(about = "Withings to Garmin weight sync - webhook and manual trigger server")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Clone)]
struct AppState {
    config: Arc<SyncConfig>,
}

/// Form-encoded body Withings POSTs to the webhook endpoint
#[derive(Debug, Deserialize)]
struct WebhookNotification {
    userid: Option<String>,
    appli: Option<i64>,
    startdate: Option<i64>,
    enddate: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ManualSyncParams {
    days: Option<i64>,
}

type ApiError = (StatusCode, Json<Value>);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = SyncConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let addr = format!("0.0.0.0:{}", config.http_port);
    let state = AppState {
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/webhook/withings", get(webhook_verify).post(webhook_post))
        .route("/sync/manual", post(manual_sync))
        .with_state(state);

    info!(addr = %addr, "scale-sync server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to install shutdown signal handler");
    }
}

fn build_orchestrator(
    config: &SyncConfig,
    secrets: scale_sync::secrets::StaticSecrets,
) -> Result<SyncOrchestrator<WithingsClient, GarminClient>, SyncError> {
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(config.session_store_path.clone()));
    let source = WithingsClient::new(
        Arc::clone(&store),
        secrets.withings_client_id,
        secrets.withings_client_secret,
    )?;
    let destination = GarminClient::new(store)?;
    Ok(SyncOrchestrator::new(source, destination, config))
}

async fn run_trigger(config: &SyncConfig, trigger: Trigger) -> Result<RunResult, SyncError> {
    // Secrets are fetched once per invocation, never cached across them
    let secrets = EnvSecretStore.fetch().await?;
    build_orchestrator(config, secrets)?.run(trigger).await
}

fn error_response(e: &SyncError) -> ApiError {
    let status = if e.requires_operator_action() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_GATEWAY
    };
    (
        status,
        Json(json!({ "status": "error", "message": e.to_string() })),
    )
}

fn success_response(result: &RunResult) -> Json<Value> {
    Json(json!({
        "status": "success",
        "synced": result.accepted,
        "skipped": result.skipped_count(),
        "errors": result.errors,
        "message": result.message,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Withings probes the endpoint with HEAD and GET before and during
/// subscription; both must answer 200 with an empty body.
async fn webhook_verify() -> StatusCode {
    info!("Received Withings endpoint verification request");
    StatusCode::OK
}

async fn webhook_post(
    State(state): State<AppState>,
    Form(notification): Form<WebhookNotification>,
) -> Result<Json<Value>, ApiError> {
    info!(
        userid = notification.userid.as_deref().unwrap_or("unknown"),
        appli = notification.appli.unwrap_or_default(),
        "Received Withings webhook notification"
    );

    if notification.appli != Some(APPLI_WEIGHT) {
        return Ok(Json(json!({
            "status": "ignored",
            "reason": "not a weight measurement",
        })));
    }

    let trigger = Trigger::Webhook {
        start: notification
            .startdate
            .and_then(|s| Utc.timestamp_opt(s, 0).single()),
        end: notification
            .enddate
            .and_then(|s| Utc.timestamp_opt(s, 0).single()),
    };

    match run_trigger(&state.config, trigger).await {
        Ok(result) => Ok(success_response(&result)),
        Err(e) => {
            error!(error = %e, "Webhook-triggered sync failed");
            Err(error_response(&e))
        }
    }
}

async fn manual_sync(
    State(state): State<AppState>,
    Query(params): Query<ManualSyncParams>,
) -> Result<Json<Value>, ApiError> {
    info!(days = params.days.unwrap_or_default(), "Manual sync triggered");

    let trigger = Trigger::Manual { days: params.days };
    match run_trigger(&state.config, trigger).await {
        Ok(result) => Ok(success_response(&result)),
        Err(e) => {
            error!(error = %e, "Manual sync failed");
            Err(error_response(&e))
        }
    }
}
