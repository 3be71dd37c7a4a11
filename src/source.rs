//! The data source contract: the capability a user implements.

use crate::identity::Identity;
use crate::query::Query;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A list of at least one identity, used by [`DataSource::fetch_many`] and
/// [`crate::fetch::Fetch::many`] -- a `Many` request is never empty by
/// construction.
#[derive(Debug, Clone)]
pub struct NonEmptyVec<T> {
    head: T,
    tail: Vec<T>,
}

impl<T> NonEmptyVec<T> {
    /// Build a non-empty list from an explicit head and the rest.
    pub fn new(head: T, tail: Vec<T>) -> Self {
        NonEmptyVec { head, tail }
    }

    /// A list of exactly one element.
    pub fn singleton(head: T) -> Self {
        NonEmptyVec { head, tail: Vec::new() }
    }

    /// `None` if `items` is empty, otherwise the equivalent `NonEmptyVec`.
    pub fn try_from_vec(mut items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            let head = items.remove(0);
            Some(NonEmptyVec { head, tail: items })
        }
    }

    /// Number of elements (always >= 1).
    pub fn len(&self) -> usize {
        1 + self.tail.len()
    }

    /// Always `false` -- kept for API symmetry with `Vec::is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate in input order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.head).chain(self.tail.iter())
    }

    /// Consume into a plain, input-ordered `Vec`.
    pub fn into_vec(self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len());
        items.push(self.head);
        items.extend(self.tail);
        items
    }
}

/// Whether a source's *remaining* individual calls (those the interpreter
/// could not combine into a batch) may safely overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchExecution {
    /// Remaining calls must not overlap; the interpreter runs them one at
    /// a time.
    Sequentially,
    /// Remaining calls may run concurrently.
    InParallel,
}

/// The capability a user implements to resolve identities to values.
///
/// `Id` and `Value` only need to be erasable (`Send + Sync + 'static`) and
/// comparable/debuggable (`Id`); the interpreter never inspects them beyond
/// that.
pub trait DataSource: Send + Sync + 'static {
    /// The identity type local to this source.
    type Id: Send + Sync + Clone + Eq + Hash + fmt::Debug + 'static;
    /// The value type this source resolves identities to.
    type Value: Send + Sync + Clone + fmt::Debug + 'static;

    /// A stable name, used for cache namespacing and batching. Two source
    /// instances sharing a name MUST be interchangeable for caching
    /// purposes.
    fn name(&self) -> &str;

    /// A deterministic, pure mapping from this source's `Id` to the global
    /// [`Identity`] used as the cache key. The default erases `id` itself;
    /// override when two distinct `Id` values should collide in the cache.
    fn identity(&self, id: &Self::Id) -> Identity {
        Identity::new(id.clone())
    }

    /// Resolve one identity. `Ok(None)` means "not found".
    fn fetch_one(&self, id: Self::Id) -> Query<Option<Self::Value>>;

    /// Resolve a non-empty batch of identities in one call. The returned
    /// map must contain only keys drawn from `ids`; absent keys mean "not
    /// found". The default implementation issues one `fetch_one` per
    /// identity and assembles the map, folding concurrently via `Query::map2`
    /// when [`batch_execution`](Self::batch_execution) is `InParallel` and
    /// one at a time via the crate-internal `Query::seq2` when it is
    /// `Sequentially` -- sources backed by a true batch API should override
    /// this entirely rather than rely on either fold.
    fn fetch_many(
        &self,
        ids: NonEmptyVec<Self::Id>,
    ) -> Query<HashMap<Self::Id, Self::Value>> {
        let merge = |mut found: HashMap<Self::Id, Self::Value>, id: Self::Id, value: Option<Self::Value>| {
            if let Some(value) = value {
                found.insert(id, value);
            }
            found
        };
        match self.batch_execution() {
            BatchExecution::InParallel => ids.into_vec().into_iter().fold(
                Query::sync(|| Ok(HashMap::new())),
                |acc: Query<HashMap<Self::Id, Self::Value>>, id| {
                    let one = self.fetch_one(id.clone());
                    Query::map2(acc, one, move |found, value| merge(found, id, value))
                },
            ),
            BatchExecution::Sequentially => ids.into_vec().into_iter().fold(
                Query::sync(|| Ok(HashMap::new())),
                |acc: Query<HashMap<Self::Id, Self::Value>>, id| {
                    let one = self.fetch_one(id.clone());
                    Query::seq2(acc, one, move |found, value| merge(found, id, value))
                },
            ),
        }
    }

    /// Whether calls to this source that the interpreter could not batch
    /// together may safely run concurrently. Defaults to the conservative
    /// choice.
    fn batch_execution(&self) -> BatchExecution {
        BatchExecution::Sequentially
    }
}
