// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Spot-price advisor.
//!
//! An external component publishes spot recommendations as events bound to
//! the scaling group. The advisor arbitrates between the user-supplied spot
//! price and the freshest recommendation:
//!
//! - recommendations are only adopted once the fleet is provisioned and its
//!   nodes are ready, so initial provisioning always honors the
//!   user-supplied price;
//! - when recommendations stop arriving after one was adopted, the price is
//!   cleared rather than left frozen at the last recommendation.

use k8s_openapi::api::core::v1::Event;
use serde::Deserialize;
use tracing::{debug, warn};

/// Payload of a spot recommendation event message.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotRecommendation {
    /// Recommended bid price, as a decimal string
    pub spot_price: String,
    /// Whether spot should be used at all
    pub use_spot: bool,
}

/// Outcome of spot arbitration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotDecision {
    /// Effective spot price; `None` selects the on-demand lifecycle
    pub spot_price: Option<String>,
    /// Whether the price came from an advisor recommendation
    pub using_recommendation: bool,
}

/// Arbitrate the effective spot price for this pass.
///
/// # Arguments
///
/// * `events` - spot recommendation events bound to the scaling group
/// * `configured` - the user-supplied spot price from the spec
/// * `previously_using` - whether an earlier pass adopted a recommendation
/// * `provisioned` - whether the scaling group exists
/// * `nodes_ready` - whether the fleet's nodes are ready
#[must_use]
pub fn arbitrate(
    events: &[Event],
    configured: Option<&str>,
    previously_using: bool,
    provisioned: bool,
    nodes_ready: bool,
) -> SpotDecision {
    let configured = configured.filter(|p| !p.is_empty()).map(str::to_string);

    // A cold fleet must not flip lifecycle before its first Ready.
    if !(provisioned && nodes_ready) {
        debug!(
            provisioned = provisioned,
            nodes_ready = nodes_ready,
            "Spot recommendations gated until the fleet is ready"
        );
        return SpotDecision {
            spot_price: configured,
            using_recommendation: previously_using,
        };
    }

    match latest_recommendation(events) {
        Some(recommendation) => {
            let spot_price = if recommendation.use_spot {
                Some(recommendation.spot_price)
            } else {
                None
            };
            SpotDecision {
                spot_price,
                using_recommendation: true,
            }
        }
        None if previously_using => {
            // The advisor went quiet; do not keep bidding a stale price.
            SpotDecision {
                spot_price: None,
                using_recommendation: false,
            }
        }
        None => SpotDecision {
            spot_price: configured,
            using_recommendation: false,
        },
    }
}

/// Select the freshest parsable recommendation.
fn latest_recommendation(events: &[Event]) -> Option<SpotRecommendation> {
    let mut best: Option<(&Event, SpotRecommendation)> = None;

    for event in events {
        let Some(message) = event.message.as_deref() else {
            continue;
        };
        let recommendation = match serde_json::from_str::<SpotRecommendation>(message) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed spot recommendation event");
                continue;
            }
        };

        let newer = match &best {
            None => true,
            Some((current, _)) => {
                event.last_timestamp.as_ref().map(|t| t.0)
                    > current.last_timestamp.as_ref().map(|t| t.0)
            }
        };
        if newer {
            best = Some((event, recommendation));
        }
    }

    best.map(|(_, r)| r)
}
