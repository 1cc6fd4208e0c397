// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for reconciler-shared helpers.

use super::should_reconcile;

#[test]
fn test_spec_change_triggers_reconcile() {
    assert!(should_reconcile(Some(3), Some(2)));
}

#[test]
fn test_unchanged_spec_skips_reconcile() {
    assert!(!should_reconcile(Some(2), Some(2)));
}

#[test]
fn test_first_reconcile_always_runs() {
    assert!(should_reconcile(Some(1), None));
}

#[test]
fn test_missing_generation_skips() {
    assert!(!should_reconcile(None, None));
    assert!(!should_reconcile(None, Some(1)));
}
