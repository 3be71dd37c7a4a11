//! The `FetchException` family: every error the interpreter can raise.

use crate::env::Env;
use std::collections::HashMap;
use thiserror::Error;

/// Identifies the single-identity request that failed a round.
///
/// Only `one(id, source)` misses need this wrapper; a `many(ids, source)`
/// miss already carries its own source-to-identities map directly on
/// [`FetchException::MissingIdentities`].
#[derive(Debug, Clone)]
pub enum FailedRequest {
    /// A `one(id, source)` request came back absent.
    One {
        /// The source's stable name.
        source: String,
        /// Debug rendering of the identity that was not found.
        identity: String,
    },
}

/// The error family raised by the interpreter.
///
/// Every variant carries the [`Env`] snapshot as it stood at the moment of
/// failure -- rounds already completed are still visible to a handler that
/// wants to log or retry from a fallback `Fetch`.
#[derive(Debug, Error, Clone)]
pub enum FetchException {
    /// A `one(id, source)` request returned `None`.
    #[error("not found: {request:?}")]
    NotFound {
        /// Execution log as of the failing round.
        env: Env,
        /// The request that came back empty.
        request: FailedRequest,
    },

    /// A `many(ids, source)` request did not cover all requested identities.
    #[error("missing identities: {missing:?}")]
    MissingIdentities {
        /// Execution log as of the failing round.
        env: Env,
        /// Source name to the identities it failed to return.
        missing: HashMap<String, Vec<String>>,
    },

    /// Any other failure surfaced by a source's `Query`.
    #[error("unhandled exception: {cause}")]
    UnhandledException {
        /// Execution log as of the failing round.
        env: Env,
        /// The underlying cause, as reported by the source or the Effect.
        #[source]
        cause: std::sync::Arc<anyhow::Error>,
    },
}

/// A cheap, `Copy` discriminant for matching on [`FetchException`] without
/// destructuring -- mirrors the `category()` convenience seen on this
/// codebase's other error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`FetchException::NotFound`].
    NotFound,
    /// See [`FetchException::MissingIdentities`].
    MissingIdentities,
    /// See [`FetchException::UnhandledException`].
    Unhandled,
}

impl FetchException {
    /// Classify this error without matching on its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchException::NotFound { .. } => ErrorKind::NotFound,
            FetchException::MissingIdentities { .. } => ErrorKind::MissingIdentities,
            FetchException::UnhandledException { .. } => ErrorKind::Unhandled,
        }
    }

    /// The execution log as of the moment this error was raised.
    pub fn env(&self) -> &Env {
        match self {
            FetchException::NotFound { env, .. }
            | FetchException::MissingIdentities { env, .. }
            | FetchException::UnhandledException { env, .. } => env,
        }
    }

    pub(crate) fn unhandled(env: Env, cause: anyhow::Error) -> Self {
        FetchException::UnhandledException {
            env,
            cause: std::sync::Arc::new(cause),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FetchException>;
