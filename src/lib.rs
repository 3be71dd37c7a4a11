//! # fetch-core
//!
//! A composable, batching, deduplicating data-fetch orchestration core.
//!
//! `fetch-core` is a small embedded language for expressing dependent reads
//! from heterogeneous remote "data sources", plus an interpreter that
//! executes those reads with three optimizations applied automatically:
//!
//! - **Deduplication** -- the same identity is requested at most once per run.
//! - **Batching** -- multiple identities against the same source collapse
//!   into a single batch call.
//! - **Concurrent execution** -- independent requests against different
//!   sources run in parallel.
//!
//! The crate does not ship a concrete networked data source, a CLI, or a
//! server; it is the planner/interpreter core those are built on top of.
//!
//! ## Quick start
//!
//! ```no_run
//! use fetch_core::{DataSource, Fetch, Query};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! struct Users;
//!
//! impl DataSource for Users {
//!     type Id = u64;
//!     type Value = String;
//!
//!     fn name(&self) -> &str {
//!         "users"
//!     }
//!
//!     fn fetch_one(&self, id: u64) -> Query<Option<String>> {
//!         Query::sync(move || Ok(Some(format!("user-{id}"))))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let users = Arc::new(Users);
//! let program: Fetch<String> = Fetch::one(42, users);
//! let name = fetch_core::run(program).await?;
//! assert_eq!(name, "user-42");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// The cache trait (C4) and its default in-memory implementation.
pub mod cache;
/// Round-concurrency and tracing configuration for the interpreter.
pub mod config;
/// The `Effect` capability and the bundled Tokio-backed adapter (C1 bridge).
pub mod effect;
/// The append-only execution log produced by a run.
pub mod env;
/// Content-addressed cache keys.
pub mod identity;
/// The query algebra (C1): one synchronous or asynchronous source call.
pub mod query;
/// The data source contract (C2).
pub mod source;

/// The error taxonomy raised by the interpreter.
pub mod error;

/// The fetch program algebra (C3).
pub mod fetch;

/// Type erasure at the data-source boundary, used internally by the
/// interpreter to hold heterogeneous requests in one round. Exposed as a
/// module (rather than kept private) only so its doc comments are
/// reachable; none of its items are `pub`.
mod erased;

/// The interpreter (C5): round extraction, combination, cache filtering,
/// concurrent execution, and simplification.
pub mod interpreter;

pub use cache::{Cache, InMemoryCache};
pub use config::{InterpreterConfig, InterpreterConfigBuilder};
pub use effect::{Effect, TokioEffect};
pub use env::{Env, Round, RoundStatus};
pub use error::{ErrorKind, FailedRequest, FetchException, Result};
pub use fetch::{many, sequence, traverse, Fetch};
pub use identity::Identity;
pub use interpreter::{run, run_env, run_fetch, run_fetch_with, run_fetch_with_config, run_with_cache};
pub use query::Query;
pub use source::{BatchExecution, DataSource, NonEmptyVec};
