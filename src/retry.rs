// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for API calls.
//!
//! This module provides utilities for retrying transient Kubernetes API
//! errors (429, 5xx) with exponential backoff, and for retrying optimistic
//! writes to shared cluster state that lost a compare-and-swap race.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, warn};

use crate::provision_errors::{ProvisionError, ProvisionResult};

/// Maximum total time to spend retrying transient errors (5 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 300;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (30 seconds)
const MAX_INTERVAL_SECS: u64 = 30;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Conflict retry initial interval; the first retry is immediate, this
/// governs the second and later attempts
const CONFLICT_INITIAL_INTERVAL_MILLIS: u64 = 50;

/// Conflict retry maximum interval (5 seconds)
const CONFLICT_MAX_INTERVAL_SECS: u64 = 5;

/// Conflict retry maximum elapsed time (1 minute)
const CONFLICT_MAX_ELAPSED_TIME_SECS: u64 = 60;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent
/// thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    /// Start time for tracking total elapsed time
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let mut rng = rand::rng();
        let jittered = rng.random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create the default exponential backoff configuration for transient
/// Kubernetes API retries.
///
/// # Configuration
///
/// - **Initial interval**: 100ms
/// - **Max interval**: 30 seconds
/// - **Max elapsed time**: 5 minutes total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Create the backoff configuration for optimistic-concurrency conflicts.
///
/// Conflicts retry faster than transient server errors: the racing writer
/// has already finished, so the next attempt usually succeeds.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(CONFLICT_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(CONFLICT_MAX_INTERVAL_SECS),
        Some(Duration::from_secs(CONFLICT_MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a Kubernetes API call with exponential backoff.
///
/// Automatically retries on transient errors (HTTP 429, 5xx) and fails
/// immediately on permanent errors (4xx client errors except 429).
///
/// # Arguments
///
/// * `operation` - Async function that performs the API call
/// * `operation_name` - Human-readable name for logging (e.g., "list nodes")
///
/// # Errors
///
/// Returns an error if:
/// - A non-retryable error is encountered (4xx client error)
/// - The max elapsed time is exceeded (5 minutes)
pub async fn retry_api_call<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable Kubernetes API error, failing immediately"
                    );
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Retry an operation while it reports an optimistic-concurrency conflict.
///
/// The first retry fires immediately; later retries back off exponentially
/// up to the conflict cap. Non-conflict errors pass through untouched.
///
/// # Arguments
///
/// * `operation` - Async function performing the compare-and-swap write
/// * `operation_name` - Human-readable name for logging
///
/// # Errors
///
/// Returns the last conflict once the backoff window is exhausted, or any
/// non-conflict error as soon as it occurs.
pub async fn retry_on_conflict<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
) -> ProvisionResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ProvisionResult<T>>,
{
    let mut backoff = conflict_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                if attempt == 1 {
                    debug!(
                        operation = operation_name,
                        "Conflicting write, retrying immediately with fresh state"
                    );
                    continue;
                }
                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = operation_name,
                            attempt = attempt,
                            retry_after = ?duration,
                            "Conflicting write, will retry"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => {
                        error!(
                            operation = operation_name,
                            attempt = attempt,
                            "Conflict retries exhausted"
                        );
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Determine if a Kubernetes error is retryable.
///
/// Rate limiting (429), server errors (5xx) and connection-level failures
/// retry; client errors do not.
#[must_use]
pub fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Map a terminal `kube::Error` onto the provisioning error taxonomy.
#[must_use]
pub fn classify_kube_error(operation: &str, err: &kube::Error) -> ProvisionError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => ProvisionError::NotFound {
            kind: "object".to_string(),
            name: operation.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => ProvisionError::Conflict {
            resource: operation.to_string(),
        },
        kube::Error::Service(_) => ProvisionError::Transient {
            operation: operation.to_string(),
            reason: err.to_string(),
        },
        _ => ProvisionError::cluster(operation, err),
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
