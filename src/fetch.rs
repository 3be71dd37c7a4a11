//! The fetch program algebra (C3): a monadic and applicative description of
//! a dependent computation built from [`DataSource`] calls.
//!
//! Internally every [`Fetch<A>`] wraps a type-erased [`FetchNode`] --
//! `Pure`, `Error`, `Leaf` (the `One`/`Many` request, via
//! [`ErasedRequest`]), `Bind` (monadic `flat_map`) and `Join` (applicative
//! pairing). There is no separate `Concurrent` variant: the interpreter's
//! round loop (`crate::interpreter`) realizes "one round of independent
//! batched calls" by walking `Bind`/`Join` directly rather than by
//! rewriting the tree into an intermediate node -- see `DESIGN.md` for why
//! that is still faithful to the spec's five-node description.

use crate::cache::CacheValue;
use crate::erased::{ErasedRequest, ManyRequest, OneRequest};
use crate::error::FetchException;
use crate::identity::Identity;
use crate::source::{DataSource, NonEmptyVec};
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased representation of a [`Fetch`], so `Bind`/`Join` can hold
/// continuations and sibling programs of unrelated output types.
///
/// `Bind`/`Join` hold `Arc<dyn Fn(..)>` rather than `Box<dyn FnOnce(..)>` so
/// the whole node is cheaply `Clone`: a `Fetch<A>` is a pure description,
/// and re-running the same value a second time (re-entrancy, §4.5) requires
/// handing the interpreter an independent copy of it, not consuming the
/// original.
#[derive(Clone)]
pub(crate) enum FetchNode {
    Pure(CacheValue),
    Error(FetchException),
    Leaf(Arc<dyn ErasedRequest>),
    Bind(Box<FetchNode>, Arc<dyn Fn(CacheValue) -> FetchNode + Send + Sync>),
    Join(
        Box<FetchNode>,
        Box<FetchNode>,
        Arc<dyn Fn(CacheValue, CacheValue) -> CacheValue + Send + Sync>,
    ),
}

/// An immutable description of a dependent computation over one or more
/// [`DataSource`]s. A `Fetch<A>` describes the computation; it performs no
/// I/O until handed to [`crate::interpreter::run`] (or its siblings).
///
/// `Fetch<A>` is `Clone` (a cheap, structure-sharing clone -- every closure
/// inside is held behind an `Arc`): re-running the same `Fetch<A>` value --
/// against a fresh cache or a shared one -- always yields the same result,
/// modulo cache hits improving performance (re-entrancy, §4.5).
#[derive(Clone)]
pub struct Fetch<A> {
    pub(crate) node: FetchNode,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Clone + Send + Sync + 'static> Fetch<A> {
    pub(crate) fn from_node(node: FetchNode) -> Self {
        Fetch {
            node,
            _marker: PhantomData,
        }
    }

    fn downcast(value: CacheValue) -> A {
        value
            .downcast_ref::<A>()
            .expect("Fetch<A> yielded a value of the wrong type -- internal invariant violated")
            .clone()
    }

    /// A program that trivially yields `a`, performing no I/O.
    pub fn pure(a: A) -> Self {
        Fetch::from_node(FetchNode::Pure(Arc::new(a) as CacheValue))
    }

    /// A program that immediately fails with `e`.
    pub fn fail(e: FetchException) -> Self {
        Fetch::from_node(FetchNode::Error(e))
    }

    /// Request one value from `source`, keyed by `id`.
    pub fn one<S>(id: S::Id, source: Arc<S>) -> Self
    where
        S: DataSource<Value = A>,
    {
        let identity = source.identity(&id);
        let request = OneRequest { source, id, identity };
        Fetch::from_node(FetchNode::Leaf(Arc::new(request)))
    }

    /// Monadic sequencing: run `self`, then build and run the next program
    /// from its result. Introduces a round boundary -- the interpreter
    /// cannot start the continuation's requests until `self` resolves.
    pub fn flat_map<B, F>(self, f: F) -> Fetch<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fetch<B> + Send + Sync + 'static,
    {
        Fetch::from_node(FetchNode::Bind(
            Box::new(self.node),
            Arc::new(move |value: CacheValue| f(Fetch::<A>::downcast(value)).node),
        ))
    }

    /// Functor map, derived from [`Fetch::flat_map`] against a trivial
    /// `pure` continuation.
    pub fn map<B, F>(self, f: F) -> Fetch<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.flat_map(move |a| Fetch::pure(f(a)))
    }

    /// An optimized applicative product: eagerly combines `self` and
    /// `other`'s independent query sets into a single round wherever their
    /// heads overlap, then recurses until both sides are purely sequential
    /// (§4.5, "join as pre-planning"). `product`/`map2`/`sequence`/
    /// `traverse` are all derived from this one primitive -- it is the
    /// sole source of applicative independence the interpreter can see.
    pub fn join<B: Clone + Send + Sync + 'static>(self, other: Fetch<B>) -> Fetch<(A, B)> {
        Fetch::from_node(FetchNode::Join(
            Box::new(self.node),
            Box::new(other.node),
            Arc::new(|a: CacheValue, b: CacheValue| {
                Arc::new((Fetch::<A>::downcast(a), Fetch::<B>::downcast(b))) as CacheValue
            }),
        ))
    }

    /// Independent pairing of two programs. Equivalent to [`Fetch::join`].
    pub fn product<B: Clone + Send + Sync + 'static>(self, other: Fetch<B>) -> Fetch<(A, B)> {
        self.join(other)
    }

    /// Independent pairing of two programs, combined by `f` once both
    /// resolve.
    pub fn map2<B, C, F>(self, other: Fetch<B>, f: F) -> Fetch<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        self.join(other).map(move |(a, b)| f(a, b))
    }
}

/// Request a non-empty, order-preserving list of values from `source`, one
/// per identity.
pub fn many<S>(ids: NonEmptyVec<S::Id>, source: Arc<S>) -> Fetch<Vec<S::Value>>
where
    S: DataSource,
{
    let items: Vec<(S::Id, Identity)> = ids
        .into_vec()
        .into_iter()
        .map(|id| {
            let identity = source.identity(&id);
            (id, identity)
        })
        .collect();
    let request = ManyRequest { source, items };
    Fetch::from_node(FetchNode::Leaf(Arc::new(request)))
}

/// Run every program in `items` independently, preserving input order in
/// the result. Built from repeated [`Fetch::join`], so siblings against the
/// same or different sources combine into as few rounds as the interpreter
/// can manage.
pub fn sequence<A: Clone + Send + Sync + 'static>(items: Vec<Fetch<A>>) -> Fetch<Vec<A>> {
    items.into_iter().fold(Fetch::pure(Vec::new()), |acc, item| {
        acc.join(item).map(|(mut collected, value)| {
            collected.push(value);
            collected
        })
    })
}

/// `sequence` over `items` mapped through `f` first.
pub fn traverse<T, A, F>(items: Vec<T>, f: F) -> Fetch<Vec<A>>
where
    A: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fetch<A>,
{
    sequence(items.into_iter().map(f).collect())
}
