// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `InstanceGroup` reconcile driver.
//!
//! One pass = discovery, classification, dispatch, status write. The
//! in-pass state machine always starts at `Init`; the state stored in the
//! status subresource is a report, not an input, which keeps every pass
//! idempotent against crashes and requeues.
//!
//! Failure policy: a failing step fails the whole pass. Validation
//! failures park the resource at `Error` until the spec changes; everything
//! else keeps the resource at `ReconcileModifying` and retries.

// Module imports
pub mod create;
pub mod delete;
pub mod discovery;
pub mod rotation;
pub mod state;
pub mod status_helpers;
pub mod types;
pub mod update;
pub mod upgrade_crd;

use std::time::Instant;

#[allow(clippy::wildcard_imports)]
use self::types::*;
use self::discovery::{cloud_discovery, DiscoveredState};
use self::state::classify;
use crate::constants::{REASON_RECONCILE_COMPLETED, REASON_RECONCILE_STARTED};
use crate::metrics;

/// Run one reconcile pass for a live resource.
///
/// # Returns
///
/// The reconcile state the pass ended in; the caller derives the requeue
/// interval from it.
///
/// # Errors
///
/// Returns the failing step's error after recording it in the status
/// conditions. Retryable errors leave the resource at
/// `ReconcileModifying`; validation failures park it at `Error`.
pub async fn reconcile_instance_group(
    group: &InstanceGroup,
    ctx: &Context,
) -> ProvisionResult<ReconcileState> {
    let started = Instant::now();
    let publisher = EventPublisher::new(ctx.cluster.clone(), ResourceIdentity::from_group(group));

    publisher
        .normal(REASON_RECONCILE_STARTED, "reconcile started")
        .await;

    match apply_pass(group, ctx, publisher.clone()).await {
        Ok((next, mut status)) => {
            finish_status(group, &mut status, next);
            ctx.cluster.update_status(group, &status).await?;
            publisher
                .normal(
                    REASON_RECONCILE_COMPLETED,
                    &format!("reconcile completed, state {next}"),
                )
                .await;
            metrics::record_reconciliation(&next.to_string(), true, started.elapsed());
            Ok(next)
        }
        Err(e) => {
            let next = record_failure(group, ctx, &publisher, &e).await;
            metrics::record_reconciliation(&next.to_string(), false, started.elapsed());
            Err(e)
        }
    }
}

/// Run one teardown pass for a deleted resource.
///
/// # Returns
///
/// `Deleted` once all cloud state is gone; `Deleting` while teardown is in
/// flight. The caller keeps the finalizer until `Deleted`.
///
/// # Errors
///
/// Returns the failing step's error after recording it, so teardown is
/// retried rather than silently abandoned.
pub async fn cleanup_instance_group(
    group: &InstanceGroup,
    ctx: &Context,
) -> ProvisionResult<ReconcileState> {
    let started = Instant::now();

    // Nothing nameable to tear down without an eks block
    if group.spec.eks.is_none() {
        warn!("Deleted resource has no eks configuration, nothing to tear down");
        return Ok(ReconcileState::Deleted);
    }

    let publisher = EventPublisher::new(ctx.cluster.clone(), ResourceIdentity::from_group(group));

    match cleanup_pass(group, ctx, publisher.clone()).await {
        Ok((next, mut status)) => {
            finish_status(group, &mut status, next);
            if next != ReconcileState::Deleted {
                // the object disappears right after Deleted; skip the write
                ctx.cluster.update_status(group, &status).await?;
            }
            publisher
                .normal(
                    REASON_RECONCILE_COMPLETED,
                    &format!("teardown pass completed, state {next}"),
                )
                .await;
            metrics::record_reconciliation(&next.to_string(), true, started.elapsed());
            Ok(next)
        }
        Err(e) => {
            let next = record_failure(group, ctx, &publisher, &e).await;
            metrics::record_reconciliation(&next.to_string(), false, started.elapsed());
            Err(e)
        }
    }
}

async fn apply_pass(
    group: &InstanceGroup,
    ctx: &Context,
    publisher: EventPublisher,
) -> ProvisionResult<(ReconcileState, InstanceGroupStatus)> {
    group.validate()?;

    let mut state = cloud_discovery(group, ctx, publisher).await?;
    let classified = classify(
        ReconcileState::Init,
        group.is_deleting(),
        state.provisioned,
        state.scaling_group.as_ref(),
    );
    debug!(state = %classified, "Reconcile pass classified");

    let next = match classified {
        ReconcileState::InitCreate => {
            create::provision(group, &mut state, ctx).await?;
            ReconcileState::ReconcileModifying
        }
        ReconcileState::InitUpdate => {
            let next = update::converge(group, &mut state, ctx).await?;
            if next == ReconcileState::InitUpgrade {
                run_upgrade(group, &state, ctx).await?
            } else {
                next
            }
        }
        // deletion is routed through cleanup_instance_group
        other => other,
    };

    Ok((next, state.status))
}

async fn cleanup_pass(
    group: &InstanceGroup,
    ctx: &Context,
    publisher: EventPublisher,
) -> ProvisionResult<(ReconcileState, InstanceGroupStatus)> {
    let mut state = cloud_discovery(group, ctx, publisher).await?;
    let classified = classify(
        ReconcileState::Init,
        true,
        state.provisioned,
        state.scaling_group.as_ref(),
    );
    debug!(state = %classified, "Teardown pass classified");

    let next = match classified {
        ReconcileState::InitDelete => {
            delete::teardown(group, &mut state, ctx).await?;
            ReconcileState::Deleting
        }
        ReconcileState::Deleting => ReconcileState::Deleting,
        ReconcileState::Deleted => ReconcileState::Deleted,
        other => {
            warn!(state = %other, "Unexpected classification during teardown");
            ReconcileState::Deleting
        }
    };

    Ok((next, state.status))
}

/// Execute the configured upgrade strategy once.
async fn run_upgrade(
    group: &InstanceGroup,
    state: &DiscoveredState,
    ctx: &Context,
) -> ProvisionResult<ReconcileState> {
    let done = match group.spec.strategy.r#type {
        UpgradeStrategyType::RollingUpdate => rotation::rotate_once(group, state, ctx).await?,
        UpgradeStrategyType::Crd => {
            let strategy = group.spec.strategy.crd.as_ref().ok_or_else(|| {
                ProvisionError::validation(
                    "spec.strategy.crd",
                    "strategy type 'crd' requires a crd block",
                )
            })?;
            upgrade_crd::submit_and_poll(group, state, ctx, strategy).await?
        }
    };

    if done && state.nodes_ready {
        Ok(ReconcileState::Ready)
    } else {
        Ok(ReconcileState::ReconcileModifying)
    }
}

fn finish_status(group: &InstanceGroup, status: &mut InstanceGroupStatus, next: ReconcileState) {
    status.state = Some(next);
    status.observed_generation = group.metadata.generation;
    status_helpers::clear_failure(status);
}

/// Lift a failed pass into the status subresource.
///
/// Retryable failures keep the resource at `ReconcileModifying` so the
/// next pass retries; validation failures park it at `Error` until the
/// spec changes.
async fn record_failure(
    group: &InstanceGroup,
    ctx: &Context,
    publisher: &EventPublisher,
    error: &ProvisionError,
) -> ReconcileState {
    let next = if error.is_retryable() {
        ReconcileState::ReconcileModifying
    } else {
        ReconcileState::Err
    };

    error!(error = %error, state = %next, "Reconcile pass failed");

    let mut status = group.status.clone().unwrap_or_default();
    status.state = Some(next);
    status_helpers::set_failure(&mut status, error);
    if let Err(status_error) = ctx.cluster.update_status(group, &status).await {
        warn!(error = %status_error, "Failed to record failure in status");
    }

    publisher
        .warning(error.status_reason(), &error.to_string())
        .await;

    next
}
