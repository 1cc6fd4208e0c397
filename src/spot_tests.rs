// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the spot-price advisor.

use chrono::DateTime;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::spot::arbitrate;

fn recommendation_event(spot_price: &str, use_spot: bool, timestamp_secs: i64) -> Event {
    Event {
        message: Some(format!(
            r#"{{"spotPrice":"{spot_price}","useSpot":{use_spot}}}"#
        )),
        last_timestamp: DateTime::from_timestamp(timestamp_secs, 0).map(Time),
        ..Event::default()
    }
}

#[test]
fn test_recommendation_adopted_when_fleet_ready() {
    let events = vec![recommendation_event("0.80", true, 100)];
    let decision = arbitrate(&events, Some("0.67"), false, true, true);
    assert_eq!(decision.spot_price.as_deref(), Some("0.80"));
    assert!(decision.using_recommendation);
}

#[test]
fn test_recommendation_gated_before_first_ready() {
    // initial provisioning: group exists but nodes are not ready yet
    let events = vec![recommendation_event("0.80", true, 100)];
    let decision = arbitrate(&events, Some("0.67"), false, true, false);
    assert_eq!(decision.spot_price.as_deref(), Some("0.67"));
    assert!(!decision.using_recommendation);
}

#[test]
fn test_recommendation_gated_before_provisioned() {
    let events = vec![recommendation_event("0.80", true, 100)];
    let decision = arbitrate(&events, Some("0.67"), false, false, true);
    assert_eq!(decision.spot_price.as_deref(), Some("0.67"));
    assert!(!decision.using_recommendation);
}

#[test]
fn test_freshest_recommendation_wins() {
    let events = vec![
        recommendation_event("0.50", true, 100),
        recommendation_event("0.90", true, 300),
        recommendation_event("0.70", true, 200),
    ];
    let decision = arbitrate(&events, None, false, true, true);
    assert_eq!(decision.spot_price.as_deref(), Some("0.90"));
}

#[test]
fn test_use_spot_false_clears_the_price() {
    let events = vec![recommendation_event("0.80", false, 100)];
    let decision = arbitrate(&events, Some("0.67"), false, true, true);
    assert_eq!(decision.spot_price, None);
    assert!(decision.using_recommendation);
}

#[test]
fn test_quiet_advisor_clears_adopted_price() {
    let decision = arbitrate(&[], Some("0.67"), true, true, true);
    assert_eq!(decision.spot_price, None);
    assert!(!decision.using_recommendation);
}

#[test]
fn test_quiet_advisor_leaves_user_price_untouched() {
    let decision = arbitrate(&[], Some("0.67"), false, true, true);
    assert_eq!(decision.spot_price.as_deref(), Some("0.67"));
    assert!(!decision.using_recommendation);
}

#[test]
fn test_malformed_payloads_are_ignored() {
    let mut bad = recommendation_event("0.99", true, 400);
    bad.message = Some("not json".to_string());
    let events = vec![bad, recommendation_event("0.42", true, 100)];

    let decision = arbitrate(&events, None, false, true, true);
    assert_eq!(decision.spot_price.as_deref(), Some("0.42"));
}

#[test]
fn test_empty_configured_price_reads_as_on_demand() {
    let decision = arbitrate(&[], Some(""), false, true, true);
    assert_eq!(decision.spot_price, None);
}
