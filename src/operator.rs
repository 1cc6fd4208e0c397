// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring for the reconciliation engine.
//!
//! [`run_controller`] owns the watch loop: one `InstanceGroup` key is
//! processed at most once concurrently, different keys reconcile in
//! parallel on a bounded worker pool, and a finalizer guarantees cloud
//! teardown runs before the object disappears. The requeue policy lives
//! here too: converging states poll on a short interval, `Ready` resyncs
//! slowly, terminal states wait for object changes.
//!
//! The cloud adapter arrives through [`Context`], so the same wiring runs
//! against the SDK-backed adapter in production and the in-memory adapter
//! in tests and local development.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Error as FinalizerError, Event as FinalizerEvent};
use kube::runtime::{watcher, Controller};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::constants::{
    ERROR_REQUEUE_SECS, FINALIZER_NAME, MODIFYING_REQUEUE_SECS, READY_REQUEUE_SECS,
};
use crate::context::Context;
use crate::crd::{InstanceGroup, ReconcileState};
use crate::provision_errors::ProvisionError;
use crate::reconcilers::{cleanup_instance_group, reconcile_instance_group};

/// Errors surfaced by the controller loop.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// A reconcile pass failed
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Teardown has not reached `Deleted` yet; keep the finalizer
    #[error("deletion in progress")]
    DeletionInProgress,

    /// Finalizer bookkeeping failed
    #[error("finalizer management failed: {0}")]
    Finalizer(String),

    /// The resource carries no namespace
    #[error("resource has no namespace")]
    MissingNamespace,
}

/// Context handed to every controller invocation.
pub struct RunContext {
    /// Kubernetes client for finalizer bookkeeping
    pub client: Client,
    /// The reconciliation engine context
    pub engine: Arc<Context>,
}

/// Map a pass outcome onto a requeue interval.
///
/// Retryable states poll on the short interval; `Ready` resyncs slowly so
/// cloud-side drift is still caught; terminal states wait for the object
/// to change.
#[must_use]
pub fn action_for_state(state: ReconcileState) -> Action {
    match state {
        ReconcileState::Ready => Action::requeue(Duration::from_secs(READY_REQUEUE_SECS)),
        ReconcileState::Err | ReconcileState::Deleted => Action::await_change(),
        _ => Action::requeue(Duration::from_secs(MODIFYING_REQUEUE_SECS)),
    }
}

/// Reconcile one `InstanceGroup`, with finalizer management.
///
/// # Errors
///
/// Returns an [`OperatorError`] when the pass fails or teardown is still
/// in flight; the error policy requeues either way.
pub async fn reconcile(
    group: Arc<InstanceGroup>,
    rctx: Arc<RunContext>,
) -> Result<Action, OperatorError> {
    let namespace = group.namespace().ok_or(OperatorError::MissingNamespace)?;
    let api: Api<InstanceGroup> = Api::namespaced(rctx.client.clone(), &namespace);
    let engine = rctx.engine.clone();

    finalizer(&api, FINALIZER_NAME, group, |event| async {
        match event {
            FinalizerEvent::Apply(group) => {
                let state = reconcile_instance_group(&group, &engine).await?;
                Ok(action_for_state(state))
            }
            FinalizerEvent::Cleanup(group) => {
                let state = cleanup_instance_group(&group, &engine).await?;
                if state == ReconcileState::Deleted {
                    info!(
                        namespace = %namespace,
                        name = %group.name_any(),
                        "Instance group fully deleted"
                    );
                    Ok(Action::await_change())
                } else {
                    Err(OperatorError::DeletionInProgress)
                }
            }
        }
    })
    .await
    .map_err(|e: FinalizerError<OperatorError>| match e {
        FinalizerError::ApplyFailed(err) | FinalizerError::CleanupFailed(err) => err,
        FinalizerError::AddFinalizer(err) | FinalizerError::RemoveFinalizer(err) => {
            OperatorError::Finalizer(err.to_string())
        }
        FinalizerError::UnnamedObject => {
            OperatorError::Finalizer("object has no name".to_string())
        }
        FinalizerError::InvalidFinalizer => {
            OperatorError::Finalizer("invalid finalizer name".to_string())
        }
    })
}

/// Requeue policy for failed passes: constant backoff.
#[must_use]
pub fn error_policy(
    _group: Arc<InstanceGroup>,
    error: &OperatorError,
    _rctx: Arc<RunContext>,
) -> Action {
    debug!(error = %error, "Requeueing after error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

/// Run the controller until shutdown.
///
/// # Errors
///
/// Returns an error only when the watch stream cannot be established;
/// individual reconcile failures are requeued, not propagated.
pub async fn run_controller(client: Client, engine: Arc<Context>) -> anyhow::Result<()> {
    let api: Api<InstanceGroup> = Api::all(client.clone());
    let workers = engine.config.workers;
    let rctx = Arc::new(RunContext { client, engine });

    info!(workers = workers, "Starting InstanceGroup controller");

    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, rctx)
        .for_each_concurrent(workers, |result| async move {
            match result {
                Ok((object, _action)) => {
                    debug!(object = %object, "Reconciled");
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation errored");
                }
            }
        })
        .await;

    info!("Controller stream ended, shutting down");
    Ok(())
}

/// Initialize logging with custom format.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level, and
/// `RUST_LOG_FORMAT` for the output format (json or text).
pub fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}
