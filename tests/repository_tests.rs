// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for the aggregate repository
//!
//! Loads replay the aggregate stream of an in-memory log; saves append with
//! the version the aggregate was loaded at.

mod fixtures;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use cim_event_sourcing::aggregate::{stream_name, AggregateVersion};
use cim_event_sourcing::event_store::EventLog;
use cim_event_sourcing::outcome::FailureKind;
use cim_event_sourcing::repository::AggregateRepository;

use fixtures::*;

fn repository(log: Arc<CountingLog>) -> AggregateRepository<Account> {
    AggregateRepository::new(log, registry())
}

#[tokio::test]
async fn test_load_of_empty_stream_returns_fresh_aggregate() {
    let log = CountingLog::new();

    let account = repository(log.clone()).get_latest_version(account_id()).await.unwrap();

    assert_eq!(account.version(), AggregateVersion::NEW);
    assert!(account.historical_events().is_empty());
    assert_eq!(log.reads(), 1);
}

#[tokio::test]
async fn test_save_without_pending_events_skips_the_log() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());

    repository.save_changes(&mut account).await.unwrap();

    assert_eq!(log.inserts(), 0);
    assert_eq!(account.version(), AggregateVersion::NEW);
}

#[tokio::test]
async fn test_save_commits_pending_events() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());

    account.apply(opened(account_id(), "alice")).unwrap();
    account.apply(deposited(account_id(), 100)).unwrap();
    account.apply(withdrawn(account_id(), 40)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    assert_eq!(account.version(), AggregateVersion::new(2));
    assert_eq!(account.historical_events().len(), 3);
    assert!(account.pending_events().is_empty());
    assert_eq!(log.inner.stream_version(&account.stream_name()).await, AggregateVersion::new(2));
}

#[tokio::test]
async fn test_reload_replays_saved_state() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(opened(account_id(), "alice")).unwrap();
    account.apply(deposited(account_id(), 100)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let reloaded = repository.get_latest_version(account_id()).await.unwrap();

    assert_eq!(reloaded.state(), account.state());
    assert_eq!(reloaded.version(), AggregateVersion::new(1));
    assert_eq!(reloaded.historical_events().len(), 2);
    assert!(reloaded.pending_events().is_empty());

    let history = reloaded.historical_events();
    assert_eq!(history[1].event_number(), 1);
    assert_eq!(history[1].aggregate_id(), account_id());
}

#[tokio::test]
async fn test_saves_accumulate_versions() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());

    account.apply(deposited(account_id(), 10)).unwrap();
    repository.save_changes(&mut account).await.unwrap();
    account.apply(deposited(account_id(), 20)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    assert_eq!(account.version(), AggregateVersion::new(1));
    let reloaded = repository.get_latest_version(account_id()).await.unwrap();
    assert_eq!(reloaded.state().balance, 30);
}

#[tokio::test]
async fn test_concurrent_save_is_a_conflict() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(opened(account_id(), "alice")).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let mut first = repository.get_latest_version(account_id()).await.unwrap();
    let mut second = repository.get_latest_version(account_id()).await.unwrap();
    first.apply(deposited(account_id(), 5)).unwrap();
    second.apply(deposited(account_id(), 7)).unwrap();

    repository.save_changes(&mut first).await.unwrap();
    let failure = repository.save_changes(&mut second).await.unwrap_err();

    assert!(failure.is(FailureKind::Conflict));
    assert!(second.has_pending_events());
    assert_eq!(second.version(), AggregateVersion::new(0));

    let reloaded = repository.get_latest_version(account_id()).await.unwrap();
    assert_eq!(reloaded.state().balance, 5);
}

#[tokio::test]
async fn test_unknown_tag_in_stream_is_a_failure() {
    let log = CountingLog::new();
    log.inner
        .insert_events(
            &stream_name::<Account>(account_id()),
            AggregateVersion::NEW,
            vec![raw_event_data("interest-accrued", b"{}")],
        )
        .await
        .unwrap();

    let failure = repository(log).get_latest_version(account_id()).await.unwrap_err();

    assert!(failure.is(FailureKind::Error));
    assert!(failure.to_string().contains("interest-accrued"));
}

#[tokio::test]
async fn test_malformed_payload_is_a_failure() {
    let log = CountingLog::new();
    log.inner
        .insert_events(
            &stream_name::<Account>(account_id()),
            AggregateVersion::NEW,
            vec![raw_event_data(DEPOSITED, br#"{"amount":"lots"}"#)],
        )
        .await
        .unwrap();

    let failure = repository(log).get_latest_version(account_id()).await.unwrap_err();

    assert!(failure.is(FailureKind::Error));
}

#[tokio::test]
async fn test_apply_failure_during_replay_is_a_failure() {
    let log = CountingLog::new();
    let payload = serde_json::to_vec(&withdrawn(account_id(), 10)).unwrap();
    log.inner
        .insert_events(
            &stream_name::<Account>(account_id()),
            AggregateVersion::NEW,
            vec![raw_event_data(WITHDRAWN, &payload)],
        )
        .await
        .unwrap();

    let failure = repository(log).get_latest_version(account_id()).await.unwrap_err();

    assert!(failure.is(FailureKind::Error));
    assert!(failure.to_string().contains("Business rule violation"));
}

#[tokio::test]
async fn test_unavailable_log_is_a_critical_failure() {
    let log = CountingLog::new();
    log.set_unavailable(true);

    let failure = repository(log).get_latest_version(account_id()).await.unwrap_err();

    assert!(failure.is(FailureKind::CriticalError));
    assert!(failure.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_load_from_last_event_replays_tail_only() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(deposited(account_id(), 10)).unwrap();
    account.apply(deposited(account_id(), 20)).unwrap();
    account.apply(deposited(account_id(), 30)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let tail = repository.get_latest_version_from_last_event(account_id()).await.unwrap();

    assert_eq!(tail.version(), AggregateVersion::new(2));
    assert_eq!(tail.historical_events().len(), 1);
    assert_eq!(tail.state().balance, 30);
    assert_eq!(log.reads(), 0);
    assert_eq!(log.backward_reads(), 1);
}

#[tokio::test]
async fn test_tail_window_covering_the_stream_equals_full_replay() {
    let log = CountingLog::new();
    let repository = repository(log.clone()).with_tail_window(10);
    let mut account = repository.create(account_id());
    account.apply(opened(account_id(), "alice")).unwrap();
    account.apply(deposited(account_id(), 20)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let tail = repository.get_latest_version_from_last_event(account_id()).await.unwrap();
    let full = repository.get_latest_version(account_id()).await.unwrap();

    assert_eq!(tail.state(), full.state());
    assert_eq!(tail.version(), full.version());
}

#[tokio::test]
async fn test_tail_loaded_aggregate_can_be_saved() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(deposited(account_id(), 10)).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let mut tail = repository.get_latest_version_from_last_event(account_id()).await.unwrap();
    tail.apply(deposited(account_id(), 5)).unwrap();
    repository.save_changes(&mut tail).await.unwrap();

    assert_eq!(tail.version(), AggregateVersion::new(1));
}

#[tokio::test]
async fn test_streams_are_isolated_per_aggregate() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let other_id = parse_uuid(ACCOUNT_ID_2);

    let mut first = repository.create(account_id());
    first.apply(deposited(account_id(), 1)).unwrap();
    repository.save_changes(&mut first).await.unwrap();

    let mut second = repository.create(other_id);
    second.apply(deposited(other_id, 2)).unwrap();
    repository.save_changes(&mut second).await.unwrap();

    assert_eq!(repository.get_latest_version(account_id()).await.unwrap().state().balance, 1);
    assert_eq!(repository.get_latest_version(other_id).await.unwrap().state().balance, 2);
}

#[tokio::test]
async fn test_write_metadata_carries_aggregate_metadata() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(opened(account_id(), "alice")).unwrap();
    repository.save_changes(&mut account).await.unwrap();

    let records = log.inner.read_events(&account.stream_name(), 0).await.unwrap();
    let metadata: serde_json::Value = serde_json::from_slice(&records[0].metadata).unwrap();

    assert_eq!(records[0].event_type, OPENED);
    assert_eq!(metadata["aggregate"]["owner"], "alice");
}

#[tokio::test]
async fn test_partial_append_is_critical_and_leaves_events_pending() {
    let log = CountingLog::new();
    let repository = repository(log.clone());
    let mut account = repository.create(account_id());
    account.apply(opened(account_id(), "alice")).unwrap();
    account.apply(deposited(account_id(), 100)).unwrap();
    account.apply(withdrawn(account_id(), 40)).unwrap();
    log.set_partial_appends(true);

    let failure = repository.save_changes(&mut account).await.unwrap_err();

    assert!(failure.is(FailureKind::CriticalError));
    assert!(failure.errors[0].contains("Partial append"));
    assert!(failure.errors[0].contains("1 of 3 records stored"));
    assert_eq!(account.pending_events().len(), 3);
    assert_eq!(account.version(), AggregateVersion::NEW);

    log.set_partial_appends(false);
    let reloaded = repository.get_latest_version(account_id()).await.unwrap();
    assert_eq!(reloaded.version(), AggregateVersion::new(0));
    assert_eq!(reloaded.historical_events().len(), 1);
}
