// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation engine.
//!
//! Every reconcile pass receives an `Arc<Context>` carrying the two adapter
//! handles, operator configuration, and the cached instance-type catalog.
//! The catalog is fetched at most once per TTL window because it feeds every
//! pool computation and changes rarely; a fetch error invalidates the cache
//! (the catalog is advisory).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::cloud::types::InstanceTypeInfo;
use crate::cloud::CloudProvider;
use crate::cluster::ClusterProvider;
use crate::constants::{
    DEFAULT_CATALOG_TTL_SECS, DEFAULT_CONFIG_RETENTION, DEFAULT_DRAIN_GRACE_SECS, DEFAULT_WORKERS,
};
use crate::provision_errors::ProvisionResult;

/// Operator-level configuration knobs.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Superseded scaling configurations kept next to the active one
    pub config_retention: usize,

    /// Pod eviction grace period used during node drain, in seconds
    pub drain_grace_seconds: u32,

    /// Time-to-live of the instance-type catalog cache
    pub catalog_ttl: Duration,

    /// Reconcile concurrency of the controller loop
    pub workers: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            config_retention: DEFAULT_CONFIG_RETENTION,
            drain_grace_seconds: DEFAULT_DRAIN_GRACE_SECS,
            catalog_ttl: Duration::from_secs(DEFAULT_CATALOG_TTL_SECS),
            workers: DEFAULT_WORKERS,
        }
    }
}

struct CatalogCache {
    fetched_at: Instant,
    types: Vec<InstanceTypeInfo>,
}

/// Shared context passed to every reconcile pass.
pub struct Context {
    /// Cloud adapter
    pub cloud: Arc<dyn CloudProvider>,

    /// Cluster adapter
    pub cluster: Arc<dyn ClusterProvider>,

    /// Operator configuration
    pub config: OperatorConfig,

    catalog: Mutex<Option<CatalogCache>>,
}

impl Context {
    /// Build a context from adapter handles and configuration.
    #[must_use]
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        cluster: Arc<dyn ClusterProvider>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            cloud,
            cluster,
            config,
            catalog: Mutex::new(None),
        }
    }

    /// The instance-type catalog, served from cache within the TTL.
    ///
    /// # Errors
    ///
    /// Propagates the cloud error when the catalog must be refreshed and
    /// the describe call fails; the stale cache entry is dropped so the
    /// next pass retries.
    pub async fn instance_types(&self) -> ProvisionResult<Vec<InstanceTypeInfo>> {
        let mut cache = self.catalog.lock().await;

        if let Some(entry) = cache.as_ref() {
            if entry.fetched_at.elapsed() < self.config.catalog_ttl {
                return Ok(entry.types.clone());
            }
        }

        match self.cloud.describe_instance_types().await {
            Ok(types) => {
                debug!(count = types.len(), "Instance-type catalog refreshed");
                *cache = Some(CatalogCache {
                    fetched_at: Instant::now(),
                    types: types.clone(),
                });
                Ok(types)
            }
            Err(e) => {
                *cache = None;
                Err(e)
            }
        }
    }
}
