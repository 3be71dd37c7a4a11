//! Type erasure at the data-source boundary.
//!
//! A `Concurrent` round holds a heterogeneous set of requests, possibly
//! against sources with entirely unrelated `Id`/`Value` types. [`ErasedSource`]
//! and [`ErasedRequest`] are the erased counterparts of [`DataSource`] and a
//! `One`/`Many` node, re-typed only at the edges (construction, in
//! `fetch.rs`, and resolution, in `resolve`) via `Any` downcasting.

use crate::cache::CacheValue;
use crate::identity::{CacheKey, Identity};
use crate::query::{AnyBox, Query};
use crate::source::{DataSource, NonEmptyVec};
use std::collections::HashMap;
use std::sync::Arc;

/// Object-safe, read-only view of a [`crate::cache::Cache`], used by the
/// erased request/source machinery so it does not need to be generic over
/// the concrete cache type.
pub(crate) trait CacheRead: Send + Sync {
    fn get_erased(&self, key: &CacheKey) -> Option<CacheValue>;

    fn contains_erased(&self, key: &CacheKey) -> bool {
        self.get_erased(key).is_some()
    }
}

impl<C: crate::cache::Cache> CacheRead for C {
    fn get_erased(&self, key: &CacheKey) -> Option<CacheValue> {
        crate::cache::Cache::get(self, key)
    }
}

/// Type-erased counterpart of [`DataSource`].
pub(crate) trait ErasedSource: Send + Sync {
    fn name(&self) -> Arc<str>;
    fn fetch_one(&self, id: AnyBox) -> Query<Option<AnyBox>>;
    fn fetch_many(&self, ids: NonEmptyVec<AnyBox>) -> Query<HashMap<Identity, AnyBox>>;

    /// Re-erase a value this source just produced as a [`CacheValue`].
    ///
    /// `fetch_one`/`fetch_many` hand back a `Box<dyn Any + Send>` (the
    /// `Query` algebra only requires `Send`), while the cache stores
    /// `Arc<dyn Any + Send + Sync>` (entries are shared across clones of a
    /// persistent map). Only the concrete `SourceWrapper<S>` that produced
    /// `value` knows it is really an `S::Value`, which is `Send + Sync` by
    /// `DataSource`'s own bound -- so the downcast-and-reseal happens here,
    /// at the one place that still has `S` in scope.
    fn value_to_cache(&self, value: AnyBox) -> CacheValue;
}

pub(crate) struct SourceWrapper<S: DataSource>(pub Arc<S>);

impl<S: DataSource> ErasedSource for SourceWrapper<S> {
    fn name(&self) -> Arc<str> {
        Arc::from(self.0.name())
    }

    fn fetch_one(&self, id: AnyBox) -> Query<Option<AnyBox>> {
        let id = *id
            .downcast::<S::Id>()
            .expect("DataSource::Id mismatch -- internal invariant violated");
        self.0
            .fetch_one(id)
            .map(|value| value.map(|v| Box::new(v) as AnyBox))
    }

    fn fetch_many(&self, ids: NonEmptyVec<AnyBox>) -> Query<HashMap<Identity, AnyBox>> {
        let source = self.0.clone();
        let typed_ids = downcast_ids::<S::Id>(ids);
        self.0.fetch_many(typed_ids).map(move |values| {
            values
                .into_iter()
                .map(|(id, value)| (source.identity(&id), Box::new(value) as AnyBox))
                .collect()
        })
    }

    fn value_to_cache(&self, value: AnyBox) -> CacheValue {
        let typed = *value
            .downcast::<S::Value>()
            .expect("DataSource::Value mismatch -- internal invariant violated");
        Arc::new(typed) as CacheValue
    }
}

fn downcast_ids<T: Send + 'static>(ids: NonEmptyVec<AnyBox>) -> NonEmptyVec<T> {
    let typed: Vec<T> = ids
        .into_vec()
        .into_iter()
        .map(|boxed| {
            *boxed
                .downcast::<T>()
                .expect("DataSource::Id mismatch -- internal invariant violated")
        })
        .collect();
    NonEmptyVec::try_from_vec(typed).expect("a non-empty input yields a non-empty output")
}

/// Type-erased counterpart of a single `One`/`Many` node: enough to group
/// it with sibling requests against the same source, check whether the
/// cache already satisfies it, and -- once it does -- produce its typed
/// result.
pub(crate) trait ErasedRequest: Send + Sync {
    fn source(&self) -> Arc<dyn ErasedSource>;

    /// This request's own `(id, identity)` pairs, in input order. Ids are
    /// cloned out rather than moved so the owning `Fetch` node can be
    /// inspected again on a later round (e.g. after a `join` pre-plan).
    fn items(&self) -> Vec<(AnyBox, Identity)>;

    fn identities(&self) -> Vec<Identity> {
        self.items().into_iter().map(|(_, identity)| identity).collect()
    }

    fn fulfilled_by(&self, cache: &dyn CacheRead) -> bool {
        let name = self.source().name();
        self.identities()
            .iter()
            .all(|identity| cache.contains_erased(&(name.clone(), identity.clone())))
    }

    /// Build this request's typed result, re-erased as a [`CacheValue`] so
    /// it can be dropped straight into a [`crate::fetch::FetchNode::Pure`].
    /// Panics if called before `fulfilled_by` confirms the cache satisfies
    /// it -- callers always check first.
    fn resolve(&self, cache: &dyn CacheRead) -> CacheValue;
}

pub(crate) struct OneRequest<S: DataSource> {
    pub source: Arc<S>,
    pub id: S::Id,
    pub identity: Identity,
}

impl<S: DataSource> ErasedRequest for OneRequest<S> {
    fn source(&self) -> Arc<dyn ErasedSource> {
        Arc::new(SourceWrapper(self.source.clone()))
    }

    fn items(&self) -> Vec<(AnyBox, Identity)> {
        vec![(Box::new(self.id.clone()) as AnyBox, self.identity.clone())]
    }

    fn resolve(&self, cache: &dyn CacheRead) -> CacheValue {
        let key = (Arc::from(self.source.name()), self.identity.clone());
        cache
            .get_erased(&key)
            .expect("resolve called before fulfilled_by confirmed presence")
    }
}

pub(crate) struct ManyRequest<S: DataSource> {
    pub source: Arc<S>,
    /// `(id, identity)` pairs in the order the caller supplied them;
    /// `resolve` preserves this order in the returned `Vec`.
    pub items: Vec<(S::Id, Identity)>,
}

impl<S: DataSource> ErasedRequest for ManyRequest<S> {
    fn source(&self) -> Arc<dyn ErasedSource> {
        Arc::new(SourceWrapper(self.source.clone()))
    }

    fn items(&self) -> Vec<(AnyBox, Identity)> {
        self.items
            .iter()
            .map(|(id, identity)| (Box::new(id.clone()) as AnyBox, identity.clone()))
            .collect()
    }

    fn resolve(&self, cache: &dyn CacheRead) -> CacheValue {
        let values: Vec<S::Value> = self
            .items
            .iter()
            .map(|(_, identity)| {
                let key = (Arc::from(self.source.name()), identity.clone());
                cache
                    .get_erased(&key)
                    .expect("resolve called before fulfilled_by confirmed presence")
                    .downcast_ref::<S::Value>()
                    .expect("cache value type mismatch -- internal invariant violated")
                    .clone()
            })
            .collect();
        Arc::new(values) as CacheValue
    }
}

/// The result of Step 2 (Combination): every identity requested against one
/// source this round, deduplicated, paired with one representative id used
/// to actually call the source.
pub(crate) struct CombinedRequest {
    pub source: Arc<dyn ErasedSource>,
    pub items: Vec<(AnyBox, Identity)>,
}

impl CombinedRequest {
    /// Group a round's extracted requests by source name, unioning and
    /// deduplicating identities within each group (Step 2).
    pub fn combine(requests: &[Arc<dyn ErasedRequest>]) -> Vec<CombinedRequest> {
        let mut order: Vec<Arc<str>> = Vec::new();
        let mut groups: HashMap<Arc<str>, (Arc<dyn ErasedSource>, Vec<(AnyBox, Identity)>)> =
            HashMap::new();

        for request in requests {
            let source = request.source();
            let name = source.name();
            let entry = groups.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                (source, Vec::new())
            });
            for (id, identity) in request.items() {
                if !entry.1.iter().any(|(_, seen)| *seen == identity) {
                    entry.1.push((id, identity));
                }
            }
        }

        order
            .into_iter()
            .map(|name| {
                let (source, items) = groups.remove(&name).expect("group was just inserted");
                CombinedRequest { source, items }
            })
            .collect()
    }

    pub fn is_fulfilled_by(&self, cache: &dyn CacheRead) -> bool {
        let name = self.source.name();
        self.items
            .iter()
            .all(|(_, identity)| cache.contains_erased(&(name.clone(), identity.clone())))
    }

    /// Step 3 (Cache filter), at identity granularity: split this group's
    /// identities into those the working cache already serves and those
    /// that still need a source call. Per-identity (not whole-group)
    /// trimming is what actually delivers the *Deduplication* property
    /// (§8) once a source is referenced by more than one `Fetch` leaf --
    /// otherwise an identity already resolved by an earlier leaf would be
    /// re-requested whenever it shares a round with a sibling that is only
    /// partially cached.
    pub fn split_by_cache(self, cache: &dyn CacheRead) -> (Vec<Identity>, Option<CombinedRequest>) {
        let name = self.source.name();
        let mut cached = Vec::new();
        let mut remaining = Vec::new();
        for (id, identity) in self.items {
            if cache.contains_erased(&(name.clone(), identity.clone())) {
                cached.push(identity);
            } else {
                remaining.push((id, identity));
            }
        }
        let survivor = if remaining.is_empty() {
            None
        } else {
            Some(CombinedRequest {
                source: self.source,
                items: remaining,
            })
        };
        (cached, survivor)
    }

    /// Step 4 (Concurrent execution) for one combined group: issue a single
    /// `fetch_one` when the group collapsed to one identity, or a single
    /// `fetch_many` otherwise (Step 2's "group of size 1 becomes a `One`;
    /// larger groups become a `Many`" rule, applied post-trim).
    pub fn execute(self) -> Query<RoundOutcome> {
        let CombinedRequest { source, items } = self;
        let name = source.name();

        if items.len() == 1 {
            let (id, identity) = items.into_iter().next().expect("checked len == 1 above");
            let value_source = source.clone();
            source.fetch_one(id).map(move |found| match found {
                Some(value) => RoundOutcome {
                    source_name: name,
                    is_single: true,
                    resolved: vec![(identity, value_source.value_to_cache(value))],
                    missing: vec![],
                },
                None => RoundOutcome {
                    source_name: name,
                    is_single: true,
                    resolved: vec![],
                    missing: vec![identity],
                },
            })
        } else {
            let identities: Vec<Identity> = items.iter().map(|(_, identity)| identity.clone()).collect();
            let ids: Vec<AnyBox> = items.into_iter().map(|(id, _)| id).collect();
            let non_empty =
                NonEmptyVec::try_from_vec(ids).expect("combine() never produces an empty group");
            let value_source = source.clone();
            source.fetch_many(non_empty).map(move |mut found| {
                let mut resolved = Vec::with_capacity(identities.len());
                let mut missing = Vec::new();
                for identity in identities {
                    match found.remove(&identity) {
                        Some(value) => resolved.push((identity, value_source.value_to_cache(value))),
                        None => missing.push(identity),
                    }
                }
                RoundOutcome {
                    source_name: name,
                    is_single: false,
                    resolved,
                    missing,
                }
            })
        }
    }
}

/// Step 4/5/6 input: the result of running one [`CombinedRequest`] --
/// which identities resolved to a cache-ready value and which came back
/// absent -- plus enough context (`source_name`, `is_single`) for the
/// interpreter to classify a miss as `NotFound` (a `One`-shaped group) or
/// `MissingIdentities` (a `Many`-shaped group), per §7.
pub(crate) struct RoundOutcome {
    pub source_name: Arc<str>,
    pub is_single: bool,
    pub resolved: Vec<(Identity, CacheValue)>,
    pub missing: Vec<Identity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::query::ErasedEffect;

    struct Doubling;

    impl DataSource for Doubling {
        type Id = i32;
        type Value = i32;

        fn name(&self) -> &str {
            "doubling"
        }

        fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
            Query::sync(move || Ok(Some(id * 2)))
        }
    }

    #[test]
    fn combine_dedupes_identities_across_requests() {
        let source = Arc::new(Doubling);
        let a = OneRequest {
            source: source.clone(),
            id: 1,
            identity: Identity::new(1i32),
        };
        let b = OneRequest {
            source: source.clone(),
            id: 1,
            identity: Identity::new(1i32),
        };
        let c = OneRequest {
            source,
            id: 2,
            identity: Identity::new(2i32),
        };

        let requests: Vec<Arc<dyn ErasedRequest>> = vec![Arc::new(a), Arc::new(b), Arc::new(c)];
        let combined = CombinedRequest::combine(&requests);

        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].items.len(), 2, "identities 1 and 1 collapse to one");
    }

    #[tokio::test]
    async fn erased_source_fetch_one_roundtrips_through_any() {
        use crate::effect::TokioEffect;

        let source = SourceWrapper(Arc::new(Doubling));
        let effect = TokioEffect::default();
        let query = source.fetch_one(Box::new(21i32));
        let boxed = effect.run_node(query.node).await.unwrap();
        let value = boxed.downcast::<Option<AnyBox>>().unwrap();
        assert_eq!(*value.unwrap().downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn many_request_resolve_preserves_input_order() {
        let source = Arc::new(Doubling);
        let mut cache = crate::cache::InMemoryCache::new();
        let name: Arc<str> = Arc::from(source.name());
        let pairs: Vec<_> = vec![(3i32, 6i32), (1, 2)]
            .into_iter()
            .map(|(id, value)| {
                let identity = source.identity(&id);
                ((name.clone(), identity), Arc::new(value) as CacheValue)
            })
            .collect();
        cache = cache.insert_all(pairs);

        let request = ManyRequest {
            source: source.clone(),
            items: vec![
                (3, source.identity(&3)),
                (1, source.identity(&1)),
            ],
        };
        let resolved = request.resolve(&cache);
        let values = resolved.downcast_ref::<Vec<i32>>().unwrap();
        assert_eq!(values, &vec![6, 2]);
    }

    #[test]
    fn split_by_cache_trims_already_cached_identities() {
        let source = Arc::new(Doubling);
        let name: Arc<str> = Arc::from(source.name());
        let cache = crate::cache::InMemoryCache::new()
            .insert_all(vec![((name.clone(), source.identity(&1)), Arc::new(2i32) as CacheValue)]);

        let combined = CombinedRequest {
            source: Arc::new(SourceWrapper(source.clone())),
            items: vec![
                (Box::new(1i32) as AnyBox, source.identity(&1)),
                (Box::new(2i32) as AnyBox, source.identity(&2)),
            ],
        };
        let (cached, survivor) = combined.split_by_cache(&cache);
        assert_eq!(cached, vec![source.identity(&1)]);
        let survivor = survivor.expect("identity 2 still needs fetching");
        assert_eq!(survivor.items.len(), 1);
        assert_eq!(survivor.items[0].1, source.identity(&2));
    }

    #[test]
    fn split_by_cache_drops_fully_cached_group() {
        let source = Arc::new(Doubling);
        let name: Arc<str> = Arc::from(source.name());
        let cache = crate::cache::InMemoryCache::new()
            .insert_all(vec![((name, source.identity(&1)), Arc::new(2i32) as CacheValue)]);
        let combined = CombinedRequest {
            source: Arc::new(SourceWrapper(source.clone())),
            items: vec![(Box::new(1i32) as AnyBox, source.identity(&1))],
        };
        let (cached, survivor) = combined.split_by_cache(&cache);
        assert_eq!(cached.len(), 1);
        assert!(survivor.is_none());
    }

    #[tokio::test]
    async fn execute_single_item_group_runs_fetch_one() {
        let source = Arc::new(Doubling);
        let combined = CombinedRequest {
            source: Arc::new(SourceWrapper(source.clone())),
            items: vec![(Box::new(5i32) as AnyBox, source.identity(&5))],
        };
        let effect = crate::effect::TokioEffect::default();
        let outcome = effect.run_query(combined.execute()).await.unwrap();
        assert!(outcome.is_single);
        assert_eq!(outcome.resolved.len(), 1);
        assert!(outcome.missing.is_empty());
        let value = outcome.resolved[0].1.downcast_ref::<i32>().unwrap();
        assert_eq!(*value, 10);
    }

    #[tokio::test]
    async fn execute_multi_item_group_runs_fetch_many() {
        let source = Arc::new(Doubling);
        let combined = CombinedRequest {
            source: Arc::new(SourceWrapper(source.clone())),
            items: vec![
                (Box::new(1i32) as AnyBox, source.identity(&1)),
                (Box::new(2i32) as AnyBox, source.identity(&2)),
            ],
        };
        let effect = crate::effect::TokioEffect::default();
        let outcome = effect.run_query(combined.execute()).await.unwrap();
        assert!(!outcome.is_single);
        assert_eq!(outcome.resolved.len(), 2);
        assert!(outcome.missing.is_empty());
    }
}
