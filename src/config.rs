//! Interpreter configuration: round-level concurrency caps and logging.

/// Controls how [`crate::interpreter`]'s default entry points
/// (`run`/`run_env`/`run_fetch`/`run_with_cache`) run a program: how many
/// combined requests the default [`TokioEffect`](crate::effect::TokioEffect)
/// may run concurrently within one round, and how the interpreter's tracing
/// spans are named. Callers that build their own [`Effect`](crate::effect::Effect)
/// and drive [`run_fetch_with`](crate::interpreter::run_fetch_with) directly
/// configure concurrency on that effect instead -- this cap only governs the
/// effect the convenience entry points construct for you.
///
/// Mirrors this codebase's `*Config`/`*ConfigBuilder` pattern
/// ([`crate::source`] documents the contract it configures).
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum number of combined requests run concurrently within one
    /// round. `None` means unbounded.
    pub max_concurrent_requests: Option<usize>,
    /// Prefix used when naming this interpreter's tracing spans, so a host
    /// running more than one interpreter can tell them apart in logs.
    pub span_prefix: &'static str,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_concurrent_requests: None,
            span_prefix: "fetch",
        }
    }
}

impl InterpreterConfig {
    /// Start building a config from the defaults (no concurrency cap,
    /// `"fetch"` span prefix).
    pub fn builder() -> InterpreterConfigBuilder {
        InterpreterConfigBuilder::new()
    }
}

/// Builder for [`InterpreterConfig`].
#[derive(Debug, Clone)]
pub struct InterpreterConfigBuilder {
    max_concurrent_requests: Option<usize>,
    span_prefix: &'static str,
}

impl InterpreterConfigBuilder {
    fn new() -> Self {
        let default = InterpreterConfig::default();
        InterpreterConfigBuilder {
            max_concurrent_requests: default.max_concurrent_requests,
            span_prefix: default.span_prefix,
        }
    }

    /// Cap how many combined requests run concurrently within one round.
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = Some(max);
        self
    }

    /// Set the tracing span name prefix.
    pub fn span_prefix(mut self, prefix: &'static str) -> Self {
        self.span_prefix = prefix;
        self
    }

    /// Build the [`InterpreterConfig`].
    pub fn build(self) -> InterpreterConfig {
        InterpreterConfig {
            max_concurrent_requests: self.max_concurrent_requests,
            span_prefix: self.span_prefix,
        }
    }
}
