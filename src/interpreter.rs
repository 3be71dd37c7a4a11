//! The interpreter (C5): walks a [`Fetch`] program, discovers independent
//! work at each round, combines and batches it, runs it through an
//! [`Effect`], and folds the result back into the cache and [`Env`] log.
//!
//! See `DESIGN.md` for how the eight steps of §4.5 map onto `reduce`,
//! `extract`, `Combine`/`split_by_cache` (in `erased.rs`), and `simplify`
//! below.

use crate::cache::{Cache, CacheValue, InMemoryCache};
use crate::effect::{Effect, TokioEffect};
use crate::config::InterpreterConfig;
use crate::env::{Env, Round, RoundStatus};
use crate::erased::{CacheRead, CombinedRequest, ErasedRequest, RoundOutcome};
use crate::error::{FailedRequest, FetchException, Result};
use crate::fetch::{Fetch, FetchNode};
use crate::query::Query;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one pure reduction pass over a [`FetchNode`] (Step 8,
/// "Advance"): either the program is fully resolved (`Done`/`Failed`), or
/// it is `Stuck` on at least one unresolved `Leaf`/`Join` that Step 1 must
/// extract requests from.
enum Progress {
    Done(CacheValue),
    Failed(FetchException),
    Stuck(FetchNode),
}

/// Beta-reduce a program as far as possible without performing any I/O:
/// `Bind(Pure(a), cont)` collapses to `cont(a)`, `Join(Pure, Pure)`
/// collapses to `Pure`, and any `Error` short-circuits its enclosing
/// `Bind`/`Join`. Written as a trampoline over `Bind` chains (rather than
/// direct recursion) so a long `flat_map` chain does not grow the native
/// stack; `Join` still recurses, bounded by the program's applicative
/// nesting depth.
fn reduce(node: FetchNode) -> Progress {
    let mut node = node;
    loop {
        match node {
            FetchNode::Pure(a) => return Progress::Done(a),
            FetchNode::Error(e) => return Progress::Failed(e),
            FetchNode::Leaf(request) => return Progress::Stuck(FetchNode::Leaf(request)),
            FetchNode::Bind(inner, cont) => match reduce(*inner) {
                Progress::Done(a) => {
                    node = cont(a);
                    continue;
                }
                Progress::Failed(e) => return Progress::Failed(e),
                Progress::Stuck(inner) => return Progress::Stuck(FetchNode::Bind(Box::new(inner), cont)),
            },
            FetchNode::Join(a, b, combine) => {
                return match (reduce(*a), reduce(*b)) {
                    (Progress::Failed(e), _) | (_, Progress::Failed(e)) => Progress::Failed(e),
                    (Progress::Done(a), Progress::Done(b)) => Progress::Done(combine(a, b)),
                    (Progress::Done(a), Progress::Stuck(b)) => Progress::Stuck(FetchNode::Join(
                        Box::new(FetchNode::Pure(a)),
                        Box::new(b),
                        combine,
                    )),
                    (Progress::Stuck(a), Progress::Done(b)) => Progress::Stuck(FetchNode::Join(
                        Box::new(a),
                        Box::new(FetchNode::Pure(b)),
                        combine,
                    )),
                    (Progress::Stuck(a), Progress::Stuck(b)) => {
                        Progress::Stuck(FetchNode::Join(Box::new(a), Box::new(b), combine))
                    }
                };
            }
        }
    }
}

/// Step 1 (Independent-query extraction): walk the head of `node`,
/// collecting every `Leaf` reachable without crossing a `Bind`'s data
/// dependency. `Pure`/`Error` contribute nothing (they never appear as
/// `reduce`'s `Stuck` payload in a way that still has extractable work
/// beneath them); `Join` recurses into *both* sides, since they are
/// independent by construction -- this is what lets a `join`'s two
/// branches share the same round.
fn extract(node: &FetchNode) -> Vec<Arc<dyn ErasedRequest>> {
    match node {
        FetchNode::Pure(_) | FetchNode::Error(_) => Vec::new(),
        FetchNode::Leaf(request) => vec![request.clone()],
        FetchNode::Bind(inner, _) => extract(inner),
        FetchNode::Join(a, b, _) => {
            let mut requests = extract(a);
            requests.extend(extract(b));
            requests
        }
    }
}

/// Step 7 (Simplification): rewrite every `Leaf` now fully satisfied by
/// `cache` into a `Pure` of its resolved value. Recurses through
/// `Bind`/`Join` without otherwise touching their shape -- a
/// structure-preserving rewrite, per §4.5.
fn simplify(node: FetchNode, cache: &dyn CacheRead) -> FetchNode {
    match node {
        FetchNode::Pure(a) => FetchNode::Pure(a),
        FetchNode::Error(e) => FetchNode::Error(e),
        FetchNode::Leaf(request) => {
            if request.fulfilled_by(cache) {
                FetchNode::Pure(request.resolve(cache))
            } else {
                FetchNode::Leaf(request)
            }
        }
        FetchNode::Bind(inner, cont) => FetchNode::Bind(Box::new(simplify(*inner, cache)), cont),
        FetchNode::Join(a, b, combine) => {
            FetchNode::Join(Box::new(simplify(*a, cache)), Box::new(simplify(*b, cache)), combine)
        }
    }
}

/// Classification of a round's not-found/missing results (Step 5): the
/// first `One`-shaped miss wins over any `Many`-shaped misses, mirroring
/// how the two error kinds are reported independently in §7 -- a run can
/// only fail one way at a time.
enum RoundFailure {
    NotFound { source: String, identity: String },
    MissingIdentities(HashMap<String, Vec<String>>),
}

fn classify_failure(outcomes: &[RoundOutcome]) -> Option<RoundFailure> {
    for outcome in outcomes {
        if outcome.is_single {
            if let Some(identity) = outcome.missing.first() {
                return Some(RoundFailure::NotFound {
                    source: outcome.source_name.to_string(),
                    identity: format!("{identity:?}"),
                });
            }
        }
    }
    let mut missing: HashMap<String, Vec<String>> = HashMap::new();
    for outcome in outcomes {
        if !outcome.is_single && !outcome.missing.is_empty() {
            missing
                .entry(outcome.source_name.to_string())
                .or_default()
                .extend(outcome.missing.iter().map(|identity| format!("{identity:?}")));
        }
    }
    if missing.is_empty() {
        None
    } else {
        Some(RoundFailure::MissingIdentities(missing))
    }
}

/// Fold a round's surviving combined requests into a single `Query`, so
/// the `Effect` schedules them all through one `run_query` call and its
/// nested `Ap` tree (Step 4, "issue all surviving combined requests
/// concurrently").
fn build_round_query(survivors: Vec<CombinedRequest>) -> Query<Vec<RoundOutcome>> {
    survivors.into_iter().fold(Query::sync(|| Ok(Vec::new())), |acc, request| {
        Query::map2(acc, request.execute(), |mut outcomes, outcome| {
            outcomes.push(outcome);
            outcomes
        })
    })
}

/// Run `program` to completion against `cache` and `effect`, returning the
/// execution log alongside the value (§6, `run_fetch`). This is the one
/// real interpreter loop; [`run`], [`run_env`] and [`run_fetch`] are thin
/// wrappers defaulting the cache/effect/config.
pub async fn run_fetch_with<C, E, A>(
    program: Fetch<A>,
    cache: C,
    effect: &E,
    config: &InterpreterConfig,
) -> Result<(Env, A)>
where
    C: Cache,
    E: Effect,
    A: Clone + Send + Sync + 'static,
{
    let mut cache = cache;
    let mut env = Env::new();
    let mut node = simplify(program.node, &cache);

    loop {
        node = match reduce(node) {
            Progress::Done(value) => {
                let value = value.downcast_ref::<A>().expect(
                    "Fetch<A> yielded a value of the wrong type -- internal invariant violated",
                ).clone();
                return Ok((env, value));
            }
            Progress::Failed(e) => return Err(e),
            Progress::Stuck(stuck) => stuck,
        };

        let round_index = env.round_count();
        let span = tracing::debug_span!("round", prefix = config.span_prefix, index = round_index);
        let _entered = span.enter();

        let requests = extract(&node);
        tracing::trace!(extracted = requests.len(), "step 1: independent-query extraction");
        debug_assert!(
            !requests.is_empty(),
            "reduce() only returns Stuck when at least one Leaf is reachable"
        );

        let combined = CombinedRequest::combine(&requests);
        tracing::trace!(groups = combined.len(), "step 2: combination");

        let mut survivors = Vec::with_capacity(combined.len());
        let mut cached_log: Vec<(String, Vec<String>)> = Vec::new();
        for group in combined {
            let source_name = group.source.name().to_string();
            let (cached_identities, survivor) = group.split_by_cache(&cache);
            if !cached_identities.is_empty() {
                cached_log.push((
                    source_name,
                    cached_identities.iter().map(|identity| format!("{identity:?}")).collect(),
                ));
            }
            if let Some(survivor) = survivor {
                survivors.push(survivor);
            }
        }
        tracing::trace!(survivors = survivors.len(), "step 3: cache filter");

        if survivors.is_empty() {
            let round = Round {
                index: round_index,
                cached: cached_log,
                fetched: Vec::new(),
                status: RoundStatus::Completed,
            };
            tracing::debug!(status = ?round.status, "round satisfied entirely from cache");
            env = env.push(round);
            node = simplify(node, &cache);
            continue;
        }

        let fetched_log: Vec<(String, Vec<String>)> = survivors
            .iter()
            .map(|group| {
                (
                    group.source.name().to_string(),
                    group.items.iter().map(|(_, identity)| format!("{identity:?}")).collect(),
                )
            })
            .collect();

        let query = build_round_query(survivors);
        let outcomes = effect.run_query(query).await?;

        if let Some(failure) = classify_failure(&outcomes) {
            let reason = match &failure {
                RoundFailure::NotFound { source, identity } => {
                    format!("not found: {source}/{identity}")
                }
                RoundFailure::MissingIdentities(missing) => format!("missing identities: {missing:?}"),
            };
            let round = Round {
                index: round_index,
                cached: cached_log,
                fetched: fetched_log,
                status: RoundStatus::Failed { reason },
            };
            env = env.push(round);
            tracing::debug!(rounds = env.round_count(), "round failed");
            return Err(match failure {
                RoundFailure::NotFound { source, identity } => FetchException::NotFound {
                    env,
                    request: FailedRequest::One { source, identity },
                },
                RoundFailure::MissingIdentities(missing) => {
                    FetchException::MissingIdentities { env, missing }
                }
            });
        }

        let pairs: Vec<_> = outcomes
            .iter()
            .flat_map(|outcome| {
                let name: Arc<str> = outcome.source_name.clone();
                outcome
                    .resolved
                    .iter()
                    .map(move |(identity, value)| ((name.clone(), identity.clone()), value.clone()))
            })
            .collect();
        cache = cache.insert_all(pairs);

        let round = Round {
            index: round_index,
            cached: cached_log,
            fetched: fetched_log,
            status: RoundStatus::Completed,
        };
        tracing::debug!(status = ?round.status, "round completed");
        env = env.push(round);

        node = simplify(node, &cache);
    }
}

/// Build the default [`TokioEffect`] the convenience entry points
/// (`run`/`run_env`/`run_fetch`/`run_with_cache`) drive, honoring
/// `config.max_concurrent_requests`.
fn default_effect(config: &InterpreterConfig) -> TokioEffect {
    match config.max_concurrent_requests {
        Some(max) => TokioEffect::with_max_concurrent_requests(max),
        None => TokioEffect::default(),
    }
}

/// Run `program` against `cache` with a default [`TokioEffect`] and
/// default [`InterpreterConfig`], returning the log and the value.
pub async fn run_fetch<C, A>(program: Fetch<A>, cache: C) -> Result<(Env, A)>
where
    C: Cache,
    A: Clone + Send + Sync + 'static,
{
    run_fetch_with_config(program, cache, InterpreterConfig::default()).await
}

/// Run `program` against `cache` with a [`TokioEffect`] built from `config`
/// (honoring `config.max_concurrent_requests`), returning the log and the
/// value. Use [`run_fetch_with`] instead when the caller needs an `Effect`
/// other than `TokioEffect`.
pub async fn run_fetch_with_config<C, A>(
    program: Fetch<A>,
    cache: C,
    config: InterpreterConfig,
) -> Result<(Env, A)>
where
    C: Cache,
    A: Clone + Send + Sync + 'static,
{
    run_fetch_with(program, cache, &default_effect(&config), &config).await
}

/// Run `program` against `cache`, discarding the value and returning only
/// the execution log.
pub async fn run_env<C, A>(program: Fetch<A>, cache: C) -> Result<Env>
where
    C: Cache,
    A: Clone + Send + Sync + 'static,
{
    let (env, _value) = run_fetch(program, cache).await?;
    Ok(env)
}

/// Run `program` against `cache`, discarding the log and returning only the
/// value.
pub async fn run_with_cache<C, A>(program: Fetch<A>, cache: C) -> Result<A>
where
    C: Cache,
    A: Clone + Send + Sync + 'static,
{
    let (_env, value) = run_fetch(program, cache).await?;
    Ok(value)
}

/// Run `program` against a fresh, empty [`InMemoryCache`]. The most common
/// entry point (§6, `run`).
pub async fn run<A>(program: Fetch<A>) -> Result<A>
where
    A: Clone + Send + Sync + 'static,
{
    run_with_cache(program, InMemoryCache::new()).await
}
