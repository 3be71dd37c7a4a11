//! The `Effect` capability and the bundled Tokio-backed adapter.
//!
//! Scala's `Effect[M]` typeclass bundles `pure`, `flat_map`, `raise`,
//! `handle`, and `run_query`. Rust's `Result` and native `async`/`.await`
//! already provide the first four for free, so the trait here is reduced to
//! its one irreducible member -- exactly the "Effect trait monomorphized
//! per chosen runtime" redesign note.

use crate::error::{FetchException, Result};
use crate::query::{AnyBox, ErasedEffect, Query, QueryNode};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bridges a [`Query`] onto a concrete asynchronous runtime.
///
/// Implementations are expected to schedule `Query::Ap`'s two sides
/// concurrently "where the runtime permits" -- see [`TokioEffect`] for the
/// default, always-available adapter.
#[async_trait]
pub trait Effect: Send + Sync + 'static {
    /// Execute one query end to end, producing its value or a
    /// [`FetchException`].
    async fn run_query<A>(&self, query: Query<A>) -> Result<A>
    where
        A: Send + 'static;
}

/// The default [`Effect`] adapter, built on `tokio` and `futures`.
///
/// - `Query::Sync` thunks run inline on the calling task.
/// - `Query::Async` futures are raced against [`tokio::time::timeout`] when
///   a finite timeout is set.
/// - `Query::Ap` runs both sides concurrently via `futures::try_join!`;
///   `Query::Seq` (crate-internal) runs them one after the other.
///
/// An optional concurrency limit (see
/// [`InterpreterConfig`](crate::interpreter::InterpreterConfig)) caps how
/// many leaves (`Sync`/`Async` queries, the actual calls into a
/// `DataSource`) run at once. The permit is acquired inside `run_node`'s
/// `Sync`/`Async` arms rather than once per `Effect::run_query` call, so
/// the cap holds regardless of how deep a `Ap`/`Seq` tree nests -- an `Ap`
/// of three `Ap`s still never runs more leaves at once than the limit
/// allows, instead of the limit only gating "does this round run at all".
#[derive(Clone, Default)]
pub struct TokioEffect {
    concurrency_limit: Option<Arc<Semaphore>>,
}

impl TokioEffect {
    /// An adapter with no concurrency cap.
    pub fn new() -> Self {
        TokioEffect::default()
    }

    /// An adapter that runs at most `max` leaf queries at once.
    pub fn with_max_concurrent_requests(max: usize) -> Self {
        TokioEffect {
            concurrency_limit: Some(Arc::new(Semaphore::new(max.max(1)))),
        }
    }
}

#[async_trait]
impl Effect for TokioEffect {
    async fn run_query<A>(&self, query: Query<A>) -> Result<A>
    where
        A: Send + 'static,
    {
        let boxed = self.run_node(query.node).await?;
        Ok(*boxed
            .downcast::<A>()
            .expect("Query<A> yielded a value of the wrong type -- internal invariant violated"))
    }
}

#[async_trait]
impl ErasedEffect for TokioEffect {
    async fn run_node(&self, node: QueryNode) -> Result<AnyBox> {
        match node {
            QueryNode::Sync(thunk) => {
                let _permit = match &self.concurrency_limit {
                    Some(semaphore) => Some(
                        semaphore
                            .clone()
                            .acquire_owned()
                            .await
                            .expect("interpreter semaphore is never closed while the effect is alive"),
                    ),
                    None => None,
                };
                thunk()
            }
            QueryNode::Async { future, timeout } => {
                let _permit = match &self.concurrency_limit {
                    Some(semaphore) => Some(
                        semaphore
                            .clone()
                            .acquire_owned()
                            .await
                            .expect("interpreter semaphore is never closed while the effect is alive"),
                    ),
                    None => None,
                };
                match timeout {
                    Some(duration) => match tokio::time::timeout(duration, future).await {
                        Ok(result) => result,
                        Err(_elapsed) => Err(FetchException::unhandled(
                            crate::env::Env::new(),
                            anyhow::anyhow!("query timed out after {:?}", duration),
                        )),
                    },
                    None => future.await,
                }
            }
            // Sub-queries recurse through `run_node` directly (not
            // `run_query`), so each leaf acquires its own permit above
            // rather than one permit covering the whole tree.
            QueryNode::Ap(node) => node.run(self).await,
            QueryNode::Seq(node) => node.run(self).await,
        }
    }
}
