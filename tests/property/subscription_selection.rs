// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subscription Selection
//!
//! `get_new_subscriptions` never invents descriptors, never returns one that
//! is already running and never returns one matching an ignore value.

use std::collections::HashSet;

use proptest::prelude::*;

use cim_event_sourcing::subscription::{get_new_subscriptions, PersistentSubscriptionInfo};

// ============================================================================
// Strategies
// ============================================================================

fn stream_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["$ce-Account", "$ce-Order", "$ce-Customer", "$et-Shipped"]).prop_map(String::from)
}

fn group_name() -> impl Strategy<Value = String> {
    (prop::sample::select(vec!["Ledger", "Projector", "Audit", "Sync", "Mailer"]), 0u8..4)
        .prop_map(|(word, n)| format!("{word} {n}"))
}

/// Unique descriptors plus a subset of them marked as running
fn catalog_and_running() -> impl Strategy<Value = (Vec<PersistentSubscriptionInfo>, Vec<PersistentSubscriptionInfo>)> {
    prop::collection::vec((stream_name(), group_name()), 0..25)
        .prop_map(|pairs| {
            let mut seen = HashSet::new();
            pairs
                .into_iter()
                .filter(|pair| seen.insert(pair.clone()))
                .map(|(stream, group)| PersistentSubscriptionInfo::new(stream, group))
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|all| {
            let len = all.len();
            (Just(all), prop::collection::vec(any::<bool>(), len))
        })
        .prop_map(|(all, running_mask)| {
            let running = all
                .iter()
                .zip(&running_mask)
                .filter(|(_, running)| **running)
                .map(|(info, _)| info.clone())
                .collect();
            (all, running)
        })
}

fn filter_value() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec![
        "Ledger", "Projector", "Audit, Sync", "Account", "Order", "$et", " 2 ",
    ]))
    .prop_map(|value| value.map(String::from))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_without_filters_result_is_catalog_minus_running((all, running) in catalog_and_running()) {
        let new = get_new_subscriptions(&all, &running, None, None, None, None);

        let expected: Vec<_> = all.iter().filter(|info| !running.contains(info)).cloned().collect();
        prop_assert_eq!(new, expected);
    }

    #[test]
    fn prop_result_is_new_subset_of_catalog(
        (all, running) in catalog_and_running(),
        groups_to_include in filter_value(),
        groups_to_ignore in filter_value(),
        streams_to_include in filter_value(),
        streams_to_ignore in filter_value(),
    ) {
        let new = get_new_subscriptions(
            &all,
            &running,
            groups_to_include.as_deref(),
            groups_to_ignore.as_deref(),
            streams_to_include.as_deref(),
            streams_to_ignore.as_deref(),
        );

        for info in &new {
            prop_assert!(all.contains(info));
            prop_assert!(!running.contains(info));
        }
    }

    #[test]
    fn prop_ignored_names_never_selected(
        (all, running) in catalog_and_running(),
        groups_to_include in filter_value(),
        groups_to_ignore in prop::sample::select(vec!["Ledger", "Projector", "Audit", "Sync", "Mailer"]),
        streams_to_ignore in prop::sample::select(vec!["Account", "Order", "Customer", "Shipped"]),
    ) {
        let new = get_new_subscriptions(
            &all,
            &running,
            groups_to_include.as_deref(),
            Some(groups_to_ignore),
            None,
            Some(streams_to_ignore),
        );

        for info in &new {
            prop_assert!(!info.group_name.contains(groups_to_ignore));
            prop_assert!(!info.stream_name.contains(streams_to_ignore));
        }
    }
}
