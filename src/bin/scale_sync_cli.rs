// ABOUTME: Operator CLI for webhook subscription management and session seeding
// ABOUTME: Wraps the Withings notification endpoints and the session store
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # scale-sync CLI
//!
//! Usage:
//! ```bash
//! # List active Withings webhook subscriptions
//! scale-sync-cli webhook list
//!
//! # Subscribe the deployed endpoint to weight notifications
//! scale-sync-cli webhook subscribe https://example.com/webhook/withings
//!
//! # Revoke a subscription
//! scale-sync-cli webhook revoke https://example.com/webhook/withings
//!
//! # Seed the store with a refresh token from the external authorization flow
//! scale-sync-cli session seed-withings --refresh-token <token>
//!
//! # Import a Garmin session produced by the external bootstrap
//! scale-sync-cli session import-garmin --file garmin_session.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scale_sync::{
    config::SyncConfig,
    logging,
    providers::{garmin::GarminSession, WithingsClient},
    secrets::{EnvSecretStore, SecretStore},
    store::{FileSessionStore, SessionStore, GARMIN_SESSION_KEY, WITHINGS_REFRESH_TOKEN_KEY},
};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "scale-sync-cli",
    about = "scale-sync operator tool",
    long_about = "Manages Withings webhook subscriptions and seeds the session store with externally obtained credentials."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Withings webhook subscription management
    Webhook {
        #[command(subcommand)]
        action: WebhookCommand,
    },

    /// Session store seeding
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
}

#[derive(Subcommand)]
enum WebhookCommand {
    /// List active subscriptions
    List,
    /// Subscribe a callback URL to weight notifications
    Subscribe {
        /// Public HTTPS callback URL of the deployed webhook endpoint
        url: String,
    },
    /// Revoke the subscription for a callback URL
    Revoke {
        /// The callback URL to unsubscribe
        url: String,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Store a Withings refresh token obtained from the authorization flow
    SeedWithings {
        /// The refresh token to persist
        #[arg(long)]
        refresh_token: String,
    },
    /// Import a Garmin session JSON file produced by the external bootstrap
    ImportGarmin {
        /// Path to the session JSON file
        #[arg(long)]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(config.session_store_path.clone()));

    match cli.command {
        Command::Webhook { action } => {
            let secrets = EnvSecretStore.fetch().await?;
            let client = WithingsClient::new(
                store,
                secrets.withings_client_id,
                secrets.withings_client_secret,
            )?;

            match action {
                WebhookCommand::List => {
                    let profiles = client.notify_list().await?;
                    if profiles.is_empty() {
                        println!("No active webhook subscriptions.");
                    } else {
                        for (i, profile) in profiles.iter().enumerate() {
                            println!(
                                "{}. appli={} url={}{}",
                                i + 1,
                                profile.appli,
                                profile.callbackurl,
                                profile
                                    .comment
                                    .as_deref()
                                    .map(|c| format!(" ({c})"))
                                    .unwrap_or_default()
                            );
                        }
                    }
                }
                WebhookCommand::Subscribe { url } => {
                    let parsed = url::Url::parse(&url)
                        .with_context(|| format!("invalid callback URL: {url}"))?;
                    if parsed.scheme() != "https" {
                        anyhow::bail!("Withings requires an HTTPS callback URL, got: {url}");
                    }
                    client.notify_subscribe(&url).await?;
                    println!("Subscribed to weight notifications at {url}");
                }
                WebhookCommand::Revoke { url } => {
                    client.notify_revoke(&url).await?;
                    println!("Revoked webhook subscription for {url}");
                }
            }
        }

        Command::Session { action } => match action {
            SessionCommand::SeedWithings { refresh_token } => {
                store.put(WITHINGS_REFRESH_TOKEN_KEY, &refresh_token).await?;
                println!(
                    "Stored Withings refresh token in {}",
                    config.session_store_path.display()
                );
            }
            SessionCommand::ImportGarmin { file } => {
                let raw = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read {file}"))?;
                // Validate before persisting so a bad file cannot poison the store
                let _: GarminSession = serde_json::from_str(&raw)
                    .with_context(|| format!("{file} is not a valid Garmin session"))?;
                store.put(GARMIN_SESSION_KEY, &raw).await?;
                println!(
                    "Imported Garmin session into {}",
                    config.session_store_path.display()
                );
            }
        },
    }

    Ok(())
}
