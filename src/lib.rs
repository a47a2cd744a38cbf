// ABOUTME: Library entry point for the scale-sync weight reconciliation service
// ABOUTME: Wires providers, session persistence, and the sync orchestrator
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # scale-sync
//!
//! Reconciles weight measurements between Withings (the scale ecosystem) and
//! Garmin Connect, triggered by a Withings push notification or an on-demand
//! request. Built for stateless execution environments: every invocation is
//! an independent short-lived process, and all cross-invocation state flows
//! through the durable session store.
//!
//! ## Pipeline
//!
//! trigger → acquire both sessions (refresh-or-resume) → fetch candidates →
//! fetch destination history → deduplicate under tolerances → apply the
//! per-run safety cap → upload accepted records → report per-record outcome.
//!
//! ## Architecture
//!
//! - **`providers`**: Withings and Garmin clients behind capability traits
//! - **`store`**: durable key-value persistence for refreshable sessions
//! - **`secrets`**: read-only retrieval of static credentials
//! - **`sync`**: the orchestrator and the pure deduplication core
//! - **`models`**: measurements, triggers, run results, tolerance policy
//!
//! Concurrent invocations are tolerated, not excluded: session writes are
//! last-write-wins complete objects, and deduplication against destination
//! history is the backstop that keeps overlapping runs from double-writing.

/// Runtime configuration loaded from the environment
pub mod config;

/// Structured error types for the sync pipeline
pub mod errors;

/// Logging configuration built on tracing
pub mod logging;

/// Core domain models
pub mod models;

/// Provider clients and capability traits
pub mod providers;

/// Read-only static secret retrieval
pub mod secrets;

/// Durable session persistence
pub mod store;

/// The sync orchestrator and deduplication core
pub mod sync;
