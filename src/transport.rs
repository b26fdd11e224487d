//! The consumed mail-transport seam.
//!
//! The orchestrator owns no wire protocol; it hands one task at a time to
//! an external transport and classifies the result. Retried calls are NOT
//! assumed to be deduplicated server-side, which is why ambiguous
//! outcomes are treated as non-retryable upstream.

use async_trait::async_trait;

use crate::{error::TransportError, types::SendTask};

/// Provider-assigned identifier of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sends exactly one message, given a bearer credential.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Attempt delivery of `task`. A returned `MessageId` is a confirmed
    /// accept; any error is classified by [`TransportError::class`].
    async fn send_one(
        &self,
        credential: &str,
        task: &SendTask,
    ) -> Result<MessageId, TransportError>;
}
