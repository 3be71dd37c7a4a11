//! Shared fixtures for the crate-level integration tests (A5): small
//! in-memory [`DataSource`]s whose call counts make batching and
//! deduplication observable from outside the interpreter.

use fetch_core::{BatchExecution, DataSource, Query};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A `HashMap`-backed source returning `id * 10`, counting how many times
/// `fetch_one`/`fetch_many` were actually called and recording each batch's
/// membership -- the hook §8's concrete scenarios assert against.
pub struct TableSource {
    name: &'static str,
    table: HashMap<i32, i32>,
    pub fetch_one_calls: AtomicUsize,
    pub fetch_many_calls: AtomicUsize,
    pub fetch_many_batches: Mutex<Vec<Vec<i32>>>,
}

impl TableSource {
    pub fn times_ten(name: &'static str, ids: &[i32]) -> Self {
        TableSource {
            name,
            table: ids.iter().map(|&id| (id, id * 10)).collect(),
            fetch_one_calls: AtomicUsize::new(0),
            fetch_many_calls: AtomicUsize::new(0),
            fetch_many_batches: Mutex::new(Vec::new()),
        }
    }
}

impl DataSource for TableSource {
    type Id = i32;
    type Value = i32;

    fn name(&self) -> &str {
        self.name
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        let value = self.table.get(&id).copied();
        Query::sync(move || Ok(value))
    }

    fn fetch_many(&self, ids: fetch_core::NonEmptyVec<i32>) -> Query<HashMap<i32, i32>> {
        self.fetch_many_calls.fetch_add(1, Ordering::SeqCst);
        let ids_vec = ids.into_vec();
        self.fetch_many_batches.lock().unwrap().push(ids_vec.clone());
        let table = self.table.clone();
        Query::sync(move || {
            Ok(ids_vec
                .into_iter()
                .filter_map(|id| table.get(&id).map(|v| (id, *v)))
                .collect())
        })
    }

    fn batch_execution(&self) -> BatchExecution {
        BatchExecution::InParallel
    }
}

/// A source that always reports every identity as missing -- used for the
/// `NotFound` scenario (§8, scenario 6).
pub struct MissingSource {
    name: &'static str,
}

impl MissingSource {
    pub fn new(name: &'static str) -> Self {
        MissingSource { name }
    }
}

impl DataSource for MissingSource {
    type Id = i32;
    type Value = i32;

    fn name(&self) -> &str {
        self.name
    }

    fn fetch_one(&self, _id: i32) -> Query<Option<i32>> {
        Query::sync(|| Ok(None))
    }
}

/// Sets up a `tracing` subscriber that writes to the test harness's captured
/// output, so `cargo test -- --nocapture` surfaces the interpreter's
/// per-round spans/events. Safe to call from multiple tests -- subsequent
/// calls after the first are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    let _ = fmt().with_env_filter("fetch_core=debug").with_test_writer().try_init();
}
