//! Structured error type returned by every public `mtrans-core` operation.
//!
//! All fallible paths funnel into [`TranslateError`] so callers can match on a
//! single enum regardless of which component (store, pool, coordinator)
//! produced the failure. `DetectionFailure` is deliberately absent: the
//! language detector never propagates an error, it falls back to `"en"`.

use thiserror::Error;

/// Errors surfaced by the translation engine's public API.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// `from` or `to` is not in the supported language set (after alias
    /// resolution).
    #[error("unsupported language code: {0}")]
    InvalidLanguage(String),

    /// A network fetch was required but the engine is configured offline.
    #[error("network access required but OFFLINE is set")]
    Offline,

    /// The model catalog could not be read from disk or fetched over the
    /// network.
    #[error("model catalog unavailable")]
    CatalogUnavailable,

    /// The catalog has no records for the requested language pair.
    #[error("no model records for pair {0}")]
    NoSuchPair(String),

    /// A downloaded artifact failed SHA-256 verification after all retries.
    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    /// Pool construction did not reach `InitSuccess` on every worker within
    /// `WORKER_INIT_TIMEOUT_MS`.
    #[error("worker initialization timed out after {0}ms")]
    WorkerInitTimeout(u64),

    /// A worker reported `InitError` during pool construction.
    #[error("worker initialization failed: {0}")]
    WorkerInitError(String),

    /// A worker reported `TranslationError` for a single in-flight message.
    #[error("translation failed: {0}")]
    TranslationFailure(String),

    /// The request was cancelled via `CancelOne` while still queued.
    #[error("translation cancelled")]
    Cancelled,

    /// The request's pool was discarded via `discardTranslations`.
    #[error("translation discarded")]
    Discarded,

    /// `Shutdown` was called while the request was still pending.
    #[error("engine shut down")]
    Shutdown,

    /// Filesystem failure inside the Model Store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure fetching the catalog or an artifact.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog or flags file failed to parse as JSON.
    #[error("catalog parse error: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// Anything else that does not have a named kind above.
    #[error("{0}")]
    Internal(String),
}
