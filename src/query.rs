//! The leaf algebra: one synchronous or asynchronous call to a data source.
//!
//! A [`Query`] is pure data until an [`Effect`](crate::effect::Effect) runs
//! it. Internally every `Query<A>` is a type-erased [`QueryNode`] plus a
//! `PhantomData<A>`; the erasure lets [`ap`](Query::ap)/[`map2`](Query::map2)
//! pair two queries of unrelated types without Rust needing a `Query[A->B]`
//! existential (see `REDESIGN FLAGS` for why).

use crate::error::{FetchException, Result};
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

pub(crate) type AnyBox = Box<dyn Any + Send>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A leaf description of one call that yields `A`.
pub struct Query<A> {
    pub(crate) node: QueryNode,
    _marker: PhantomData<fn() -> A>,
}

/// Type-erased representation of a [`Query`], used internally so a
/// [`Query::Ap`] pair can hold two sub-queries of unrelated output types.
pub(crate) enum QueryNode {
    Sync(Box<dyn FnOnce() -> Result<AnyBox> + Send>),
    Async {
        future: BoxFuture<'static, Result<AnyBox>>,
        timeout: Option<Duration>,
    },
    Ap(Box<dyn ApNode>),
    /// Crate-internal only -- not reachable through any public `Query`
    /// constructor. The public algebra (SS4.1) still exposes just `sync`,
    /// `async`, and `ap`; `Seq` exists solely so `DataSource::fetch_many`'s
    /// default fold can honor a `Sequentially` `batch_execution()` hint
    /// without reaching for `Ap`'s concurrency.
    Seq(Box<dyn SeqNode>),
}

/// Runs both sides of an `Ap` node concurrently against whatever effect is
/// driving the interpreter, then combines their results.
#[async_trait]
pub(crate) trait ApNode: Send {
    async fn run(self: Box<Self>, effect: &dyn ErasedEffect) -> Result<AnyBox>;
}

/// Runs both sides of a `Seq` node one after the other, then combines their
/// results. The crate-internal counterpart of `ApNode` for call sites that
/// need ordering rather than concurrency -- see [`Query::seq2`].
#[async_trait]
pub(crate) trait SeqNode: Send {
    async fn run(self: Box<Self>, effect: &dyn ErasedEffect) -> Result<AnyBox>;
}

/// Object-safe counterpart of [`Effect`](crate::effect::Effect): the single
/// operation an `Ap`/`Seq` node needs, with types erased so it can be called
/// through a trait object regardless of which concrete `A` the caller has.
#[async_trait]
pub trait ErasedEffect: Send + Sync {
    #[doc(hidden)]
    async fn run_node(&self, node: QueryNode) -> Result<AnyBox>;
}

struct ApPair<B, C, A, F> {
    qb: Query<B>,
    qc: Query<C>,
    combine: F,
    _marker: PhantomData<fn() -> A>,
}

#[async_trait]
impl<B, C, A, F> ApNode for ApPair<B, C, A, F>
where
    B: Send + 'static,
    C: Send + 'static,
    A: Send + 'static,
    F: FnOnce(B, C) -> A + Send + 'static,
{
    async fn run(self: Box<Self>, effect: &dyn ErasedEffect) -> Result<AnyBox> {
        let ApPair { qb, qc, combine, .. } = *self;
        // `futures::try_join!` polls both futures to completion in lockstep
        // on the current task -- there is no `tokio::spawn` here, so this is
        // "concurrently" in the sense of interleaved polling, not separate OS
        // threads. Each side still recurses through `ErasedEffect::run_node`,
        // so a `TokioEffect`'s per-leaf concurrency permit (`effect.rs`) is
        // acquired independently by each side, not once for the pair.
        let (b, c) = futures::try_join!(run_erased(effect, qb), run_erased(effect, qc))?;
        Ok(Box::new(combine(b, c)) as AnyBox)
    }
}

struct SeqPair<B, C, A, F> {
    qb: Query<B>,
    qc: Query<C>,
    combine: F,
    _marker: PhantomData<fn() -> A>,
}

#[async_trait]
impl<B, C, A, F> SeqNode for SeqPair<B, C, A, F>
where
    B: Send + 'static,
    C: Send + 'static,
    A: Send + 'static,
    F: FnOnce(B, C) -> A + Send + 'static,
{
    async fn run(self: Box<Self>, effect: &dyn ErasedEffect) -> Result<AnyBox> {
        let SeqPair { qb, qc, combine, .. } = *self;
        // Unlike `ApPair::run`, `qc` is not even built-and-polled until `qb`
        // has fully resolved -- this is what lets a `Sequentially`-hinted
        // source's default `fetch_many` fold honor its own hint instead of
        // every fold going through `Ap`.
        let b = run_erased(effect, qb).await?;
        let c = run_erased(effect, qc).await?;
        Ok(Box::new(combine(b, c)) as AnyBox)
    }
}

async fn run_erased<T: Send + 'static>(effect: &dyn ErasedEffect, query: Query<T>) -> Result<T> {
    let boxed = effect.run_node(query.node).await?;
    Ok(*boxed
        .downcast::<T>()
        .expect("Query<T> yielded a value of the wrong type -- internal invariant violated"))
}

impl<A: Send + 'static> Query<A> {
    /// A deferred pure computation, evaluated at most once when the Effect
    /// observes it. Because a `Query` is run at most once, "memoizes within
    /// one evaluation" falls out of `thunk` being `FnOnce`.
    pub fn sync(thunk: impl FnOnce() -> Result<A> + Send + 'static) -> Self {
        Query {
            node: QueryNode::Sync(Box::new(move || thunk().map(|a| Box::new(a) as AnyBox))),
            _marker: PhantomData,
        }
    }

    /// An asynchronous computation with no timeout guard.
    pub fn async_(future: impl Future<Output = Result<A>> + Send + 'static) -> Self {
        Self::async_with_timeout(future, None)
    }

    /// An asynchronous computation that fails with a timeout error if it
    /// has not resolved within `timeout`. `None` disables the guard.
    pub fn async_with_timeout(
        future: impl Future<Output = Result<A>> + Send + 'static,
        timeout: Option<Duration>,
    ) -> Self {
        let future: BoxFuture<'static, Result<AnyBox>> =
            Box::pin(async move { future.await.map(|a| Box::new(a) as AnyBox) });
        Query {
            node: QueryNode::Async { future, timeout },
            _marker: PhantomData,
        }
    }

    /// An applicative product: evaluate `qb` and `qc` independently, then
    /// combine their results. This is the general form of `Ap`; most
    /// callers reach it through [`Fetch::product`](crate::fetch::Fetch::product)
    /// rather than directly.
    pub fn map2<B, C>(
        qb: Query<B>,
        qc: Query<C>,
        combine: impl FnOnce(B, C) -> A + Send + 'static,
    ) -> Self
    where
        B: Send + 'static,
        C: Send + 'static,
    {
        Query {
            node: QueryNode::Ap(Box::new(ApPair {
                qb,
                qc,
                combine,
                _marker: PhantomData,
            })),
            _marker: PhantomData,
        }
    }

    /// Sequential composition: run `qb` to completion, then `qc`, combining
    /// their results. Unlike [`map2`], `qc` does not start until `qb` has
    /// resolved. Crate-internal only -- used by `DataSource::fetch_many`'s
    /// default fold when a source declares itself `BatchExecution::Sequentially`.
    pub(crate) fn seq2<B, C>(
        qb: Query<B>,
        qc: Query<C>,
        combine: impl FnOnce(B, C) -> A + Send + 'static,
    ) -> Self
    where
        B: Send + 'static,
        C: Send + 'static,
    {
        Query {
            node: QueryNode::Seq(Box::new(SeqPair {
                qb,
                qc,
                combine,
                _marker: PhantomData,
            })),
            _marker: PhantomData,
        }
    }

    /// `Ap(qf, qa)`: apply a queried function to a queried argument,
    /// evaluating both independently. Expressed in terms of [`map2`],
    /// matching the `Ap(qf, qa) == map2(qf, qa, |f, a| f(a))` law.
    pub fn ap<Arg>(
        qf: Query<Box<dyn FnOnce(Arg) -> A + Send>>,
        qa: Query<Arg>,
    ) -> Self
    where
        Arg: Send + 'static,
    {
        Query::map2(qf, qa, |f, a| f(a))
    }

    /// Functor map, derived from [`map2`] against a trivial `Sync` query
    /// rather than given its own `QueryNode` variant.
    pub fn map<B>(self, f: impl FnOnce(A) -> B + Send + 'static) -> Query<B>
    where
        B: Send + 'static,
    {
        Query::map2(self, Query::sync(|| Ok(())), move |a, ()| f(a))
    }
}

/// Wraps a source-reported "not found" into the appropriate
/// [`FetchException`] variant, for Queries that need to fail from within
/// their own thunk/future (used by `DataSource` default implementations).
pub(crate) fn unhandled<E>(cause: E) -> FetchException
where
    E: std::error::Error + Send + Sync + 'static,
{
    FetchException::unhandled(crate::env::Env::new(), anyhow::Error::new(cause))
}
