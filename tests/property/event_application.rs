// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Event Application
//!
//! Replaying any sequence of deposits, with arbitrary repeats of events that
//! were already applied, must land on the same state as applying each
//! distinct event exactly once.

use std::collections::HashSet;

use proptest::prelude::*;

use cim_event_sourcing::aggregate::{AggregateRoot, AggregateVersion};

use crate::fixtures::*;

// ============================================================================
// Strategies
// ============================================================================

/// Deposit amounts plus indexes (into that list) of events to apply again
fn deposits_with_repeats() -> impl Strategy<Value = (Vec<i64>, Vec<usize>)> {
    prop::collection::vec(1i64..10_000, 1..30).prop_flat_map(|amounts| {
        let len = amounts.len();
        (Just(amounts), prop::collection::vec(0..len, 0..30))
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_duplicate_events_are_applied_once((amounts, repeats) in deposits_with_repeats()) {
        let events: Vec<FundsDeposited> = amounts.iter().map(|amount| deposited(account_id(), *amount)).collect();
        let mut account = AggregateRoot::<Account>::new(account_id());

        for event in &events {
            account.apply(event.clone()).unwrap();
        }
        for index in &repeats {
            account.apply(events[*index].clone()).unwrap();
        }

        let unique: HashSet<_> = events.iter().map(|e| e.header.event_id).collect();
        prop_assert_eq!(account.pending_events().len(), unique.len());
        prop_assert_eq!(account.state().balance, amounts.iter().sum::<i64>());
        prop_assert_eq!(account.state().deposits, amounts.len());
    }

    #[test]
    fn prop_repeats_interleaved_anywhere_do_not_change_state((amounts, repeats) in deposits_with_repeats()) {
        let events: Vec<FundsDeposited> = amounts.iter().map(|amount| deposited(account_id(), *amount)).collect();

        let mut clean = AggregateRoot::<Account>::new(account_id());
        for event in &events {
            clean.apply(event.clone()).unwrap();
        }

        let mut noisy = AggregateRoot::<Account>::new(account_id());
        let mut repeats = repeats.into_iter().peekable();
        for (position, event) in events.iter().enumerate() {
            noisy.apply(event.clone()).unwrap();
            while let Some(index) = repeats.next_if(|index| *index <= position) {
                noisy.apply(events[index].clone()).unwrap();
            }
        }

        prop_assert_eq!(noisy.state(), clean.state());
        prop_assert_eq!(noisy.pending_events().len(), clean.pending_events().len());
    }

    #[test]
    fn prop_commit_moves_pending_into_history((amounts, _) in deposits_with_repeats()) {
        let mut account = AggregateRoot::<Account>::new(account_id());
        for amount in &amounts {
            account.apply(deposited(account_id(), *amount)).unwrap();
        }

        account.commit_pending_events();

        prop_assert!(!account.has_pending_events());
        prop_assert_eq!(account.historical_events().len(), amounts.len());
        prop_assert_eq!(account.version(), AggregateVersion::NEW);
        prop_assert_eq!(account.state().deposits, amounts.len());
    }
}
