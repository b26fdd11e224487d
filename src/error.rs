//! Typed error handling for campaign sending.
//!
//! Two distinct error surfaces exist here:
//! - [`TransportError`]: what the mail transport reports for a single
//!   message, classified into retry behavior via [`FailureClass`].
//! - [`SendError`]: precondition/programmer errors that surface from the
//!   runner's operations themselves. Per-task failures never become
//!   `SendError`s; they are captured as `SendOutcome` values.

use thiserror::Error;

/// How a transport failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Provider throttling signal: retry the same attempt after the shared
    /// exponential backoff, without consuming the attempt counter.
    RateLimited,
    /// Terminal for the task (and, by policy, for the campaign): no retry.
    NonRetryable,
    /// Likely to succeed on retry: fixed delay, consumes one attempt.
    Transient,
}

/// Failure reported by the mail transport for one message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider signalled throttling (quota or rate limit).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The bearer credential was rejected.
    #[error("Credential rejected: {0}")]
    CredentialRejected(String),

    /// The recipient address is malformed or was refused outright.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The message exceeds the provider's size limits.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// The call failed in a way that leaves delivery in doubt. Treated as
    /// non-retryable: retrying risks a duplicate send.
    #[error("Delivery outcome ambiguous: {0}")]
    AmbiguousDelivery(String),

    /// The call timed out before a definitive rejection.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (refused, reset, DNS, ...).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Provider returned a 5xx-style server error.
    #[error("Server error: {0}")]
    Server(String),
}

impl TransportError {
    /// Classify this failure for the retry loop.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited(_) => FailureClass::RateLimited,
            Self::CredentialRejected(_)
            | Self::InvalidRecipient(_)
            | Self::PayloadTooLarge(_)
            | Self::AmbiguousDelivery(_) => FailureClass::NonRetryable,
            Self::Timeout(_) | Self::Connection(_) | Self::Server(_) => FailureClass::Transient,
        }
    }

    /// Returns `true` if this is a throttling signal.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.class(), FailureClass::RateLimited)
    }

    /// Returns `true` if retrying this failure is useless or unsafe.
    #[must_use]
    pub const fn is_non_retryable(&self) -> bool {
        matches!(self.class(), FailureClass::NonRetryable)
    }
}

/// Errors surfaced by the runner's operations (`send`, `resume`,
/// `retry_failed`) themselves.
#[derive(Debug, Error)]
pub enum SendError {
    /// Another execution context holds a live send lease for this account.
    #[error("A send is already running in another session")]
    AlreadyRunningElsewhere,

    /// The credential is invalid and cannot be refreshed; the caller must
    /// re-authenticate before any send is attempted.
    #[error("Authentication required before sending")]
    AuthRequired,

    /// `send` was called with an empty task list.
    #[error("Campaign has no tasks to send")]
    EmptyCampaign,

    /// `resume` found no persisted campaign, or it already completed.
    #[error("No interrupted campaign to resume")]
    NothingToResume,

    /// `retry_failed` found no failed tasks from the most recent run.
    #[error("No failed tasks from the last run to retry")]
    NothingToRetry,

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file-backed stores).
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for storage.
    #[error("Failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A stored record could not be decoded.
    #[error("Failed to decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
