//! Type definitions for campaign tasks and their recorded outcomes

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// One outbound message within a campaign.
///
/// The `index` is the task's position in the original submission. Indices
/// are unique within a campaign and are never renumbered, even when a
/// resumed run operates on a sparse subset, so progress and resume logic
/// can address tasks unambiguously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTask {
    /// Stable position in the original submission
    pub index: usize,
    /// Recipient address
    pub recipient: String,
    /// Message subject
    pub subject: String,
    /// Message body (already personalized upstream)
    pub body: String,
    /// Key-value substitution context carried alongside the message
    #[serde(default)]
    pub context: AHashMap<String, String>,
    /// References to attachments held by the caller (opaque to this crate)
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl SendTask {
    /// Create a task with an empty substitution context and no attachments
    #[must_use]
    pub fn new(
        index: usize,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            index,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            context: AHashMap::new(),
            attachments: Vec::new(),
        }
    }
}

/// How a single task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// The transport confirmed delivery
    Success,
    /// Terminal failure (retries exhausted or non-retryable)
    Error,
    /// Never attempted: a prior halt condition skipped it
    Skipped,
    /// Never attempted (or abandoned before the call) due to a stop request
    Cancelled,
}

/// Result of attempting one [`SendTask`]. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    /// Index of the originating task
    pub index: usize,
    /// Final disposition
    pub kind: OutcomeKind,
    /// Human-readable error or skip reason, where applicable
    pub message: Option<String>,
    /// Number of delivery attempts consumed
    pub retries: u32,
}

impl SendOutcome {
    /// Record a confirmed delivery
    #[must_use]
    pub const fn success(index: usize, retries: u32) -> Self {
        Self {
            index,
            kind: OutcomeKind::Success,
            message: None,
            retries,
        }
    }

    /// Record a terminal failure
    #[must_use]
    pub fn error(index: usize, message: impl Into<String>, retries: u32) -> Self {
        Self {
            index,
            kind: OutcomeKind::Error,
            message: Some(message.into()),
            retries,
        }
    }

    /// Record a task skipped before any attempt
    #[must_use]
    pub fn skipped(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            kind: OutcomeKind::Skipped,
            message: Some(reason.into()),
            retries: 0,
        }
    }

    /// Record a task abandoned by a stop request
    #[must_use]
    pub const fn cancelled(index: usize) -> Self {
        Self {
            index,
            kind: OutcomeKind::Cancelled,
            message: None,
            retries: 0,
        }
    }

    /// Whether the task was delivered
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}
