//! Error types for the resolver and its collaborators.

use thiserror::Error;

/// Top-level error returned by resolver-facing operations.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("invariant breach: {0}")]
    Invariant(#[from] InvariantError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("capacity exceeded: pending table full ({max} orders)")]
    Capacity { max: usize },

    #[error("other error: {0}")]
    Other(String),
}

/// Errors surfaced by a `ChainAdapter`. Mirrors the `kind` taxonomy in
/// spec.md §7: `Transient` is retried internally and never reaches here;
/// the other four are terminal for the call that produced them.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("submission retries exhausted for action on {chain}")]
    SubmitExhausted { chain: String },

    #[error("malformed chain data while decoding event at height {height}: {reason}")]
    Decode { height: u64, reason: String },

    #[error("RPC call to {chain} timed out after {elapsed_ms}ms")]
    Timeout { chain: String, elapsed_ms: u64 },

    #[error("RPC call to {chain} failed: {reason}")]
    Rpc { chain: String, reason: String },

    #[error("requested window of {requested} blocks exceeds max_blocks_per_query ({max})")]
    WindowTooLarge { requested: u64, max: u64 },
}

/// Errors related to order bookkeeping.
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("order already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("secret not known for order {0}")]
    SecretUnknown(String),
}

/// `InvariantBreach` per spec.md §7 — hashlock mismatch, amount mismatch,
/// or timelock skew violation. An order hitting one of these moves to
/// `Failed` and only a mandatory refund at timelock follows.
#[derive(Error, Debug, Clone)]
pub enum InvariantError {
    #[error("hashlock mismatch for order {order}: expected {expected}, got {actual}")]
    HashlockMismatch {
        order: String,
        expected: String,
        actual: String,
    },

    #[error("amount mismatch for order {order} on {chain}: expected {expected}, observed {observed}")]
    AmountMismatch {
        order: String,
        chain: String,
        expected: u128,
        observed: u128,
    },

    #[error("timelock skew violated for order {order}: target {target} must be < source {source} - {min_skew}")]
    TimelockSkew {
        order: String,
        target: u64,
        source: u64,
        min_skew: u64,
    },

    #[error("duplicate HTLC creation observed for order {order} on {chain} (I6)")]
    DuplicateHtlc { order: String, chain: String },
}

/// `Fatal` per spec.md §7 — process aborts before handling any events.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
