//! The six concrete scenarios of SPEC_FULL.md §8, run end to end through
//! the public API against small in-memory fixtures.

mod common;

use common::{init_tracing, MissingSource, TableSource};
use fetch_core::{fetch, run, run_env, run_fetch, ErrorKind, Fetch, InMemoryCache, NonEmptyVec};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn scenario_1_pure_value_runs_zero_rounds() {
    init_tracing();
    let value = run(Fetch::pure(42)).await.unwrap();
    assert_eq!(value, 42);
    let env = run_env(Fetch::pure(42), InMemoryCache::new()).await.unwrap();
    assert_eq!(env.round_count(), 0);
}

#[tokio::test]
async fn scenario_2_one_request_runs_a_single_round() {
    init_tracing();
    let source = Arc::new(TableSource::times_ten("S", &[3]));
    let (env, value) = run_fetch(Fetch::one(3, source), InMemoryCache::new()).await.unwrap();
    assert_eq!(value, 30);
    assert_eq!(env.round_count(), 1);
    assert_eq!(env.total_fetched(), 1);
}

#[tokio::test]
async fn scenario_3_product_of_the_same_identity_dedupes_to_one_fetch() {
    init_tracing();
    let source = Arc::new(TableSource::times_ten("S", &[1]));
    let (env, value) = run_fetch(
        Fetch::one(1, source.clone()).product(Fetch::one(1, source.clone())),
        InMemoryCache::new(),
    )
    .await
    .unwrap();
    assert_eq!(value, (10, 10));
    assert_eq!(env.round_count(), 1);
    assert_eq!(source.fetch_one_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.fetch_many_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_4_sequence_batches_into_one_fetch_many() {
    init_tracing();
    let source = Arc::new(TableSource::times_ten("S", &[1, 2, 3]));
    let program = fetch::sequence(vec![
        Fetch::one(1, source.clone()),
        Fetch::one(2, source.clone()),
        Fetch::one(3, source.clone()),
    ]);
    let (env, value) = run_fetch(program, InMemoryCache::new()).await.unwrap();
    assert_eq!(value, vec![10, 20, 30]);
    assert_eq!(env.round_count(), 1);
    assert_eq!(source.fetch_many_calls.load(Ordering::SeqCst), 1);
    let batches = source.fetch_many_batches.lock().unwrap();
    assert_eq!(batches[0], vec![1, 2, 3]);
}

#[tokio::test]
async fn scenario_5_flat_map_runs_two_sequential_rounds() {
    init_tracing();
    let source = Arc::new(TableSource::times_ten("S", &[1, 10]));
    let program = Fetch::one(1, source.clone()).flat_map(move |a| Fetch::one(a, source.clone()));
    let (env, value) = run_fetch(program, InMemoryCache::new()).await.unwrap();
    assert_eq!(value, 100);
    assert_eq!(env.round_count(), 2);
}

#[tokio::test]
async fn scenario_6_missing_identity_fails_with_not_found() {
    init_tracing();
    let source = Arc::new(MissingSource::new("T"));
    let result = run(Fetch::<i32>::one(7, source)).await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.env().round_count(), 1);
}

#[tokio::test]
async fn many_request_with_some_identities_missing_fails() {
    init_tracing();
    let source = Arc::new(TableSource::times_ten("S", &[1, 2]));
    let program = fetch::many(NonEmptyVec::new(1, vec![2, 3]), source);
    let err = run(program).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingIdentities);
}
