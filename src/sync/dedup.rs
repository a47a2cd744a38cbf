// ABOUTME: Pure duplicate detection between candidate measurements and destination history
// ABOUTME: Timestamp and weight tolerances evaluated independently, both must hold
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Duplicate detection.
//!
//! A candidate is a duplicate when at least one history entry matches it
//! within the timestamp tolerance AND within the weight tolerance. The two
//! conditions are checked independently; they are never folded into a single
//! distance metric. For a fixed history snapshot and fixed tolerances the
//! result is pure and independent of history ordering.
//!
//! This check is also the idempotency backstop for the whole service:
//! re-delivered notifications and concurrent runs converge because whatever
//! was already written is matched here on the next pass.

use crate::models::{TolerancePolicy, WeighIn, WeightMeasurement};

/// Whether `candidate` matches any entry in `history` under `policy`.
///
/// An empty history means no candidate is a duplicate.
#[must_use]
pub fn is_duplicate(
    candidate: &WeightMeasurement,
    history: &[WeighIn],
    policy: &TolerancePolicy,
) -> bool {
    history.iter().any(|existing| {
        let time_delta = (candidate.taken_at - existing.taken_at).abs();
        let weight_delta = (candidate.weight_kg - existing.weight_kg).abs();
        time_delta <= policy.time_tolerance && weight_delta <= policy.weight_tolerance_kg
    })
}

/// Split `candidates` into (new, duplicates) against `history`.
/// Relative ordering of the input is preserved in both halves.
#[must_use]
pub fn partition_duplicates(
    candidates: Vec<WeightMeasurement>,
    history: &[WeighIn],
    policy: &TolerancePolicy,
) -> (Vec<WeightMeasurement>, Vec<WeightMeasurement>) {
    candidates
        .into_iter()
        .partition(|candidate| !is_duplicate(candidate, history, policy))
}
