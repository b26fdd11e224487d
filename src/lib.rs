//! Bulk email delivery orchestration.
//!
//! This crate is the delivery core of a campaign-sending application: it
//! takes an ordered batch of individually-personalized messages and
//! drives them, strictly one at a time, through an unreliable,
//! rate-limited, externally-authenticated transport, while surviving
//! restarts, network outages, token expiry, and duplicate execution from
//! concurrent contexts.
//!
//! The crate owns no wire protocol, no storage engine, and no UI; those
//! arrive as injected collaborators:
//! - [`MailTransport`]: send one message, given a bearer credential
//! - [`CredentialProvider`]: check/refresh the bearer credential
//! - [`StateStore`]: durable key-value persistence shared across contexts
//! - [`ConnectivityProbe`]: transport reachability signal
//! - [`ProgressReporter`]: structured progress pushed to presentation

pub mod backoff;
pub mod cancel;
pub mod config;
pub mod credential;
pub mod error;
pub mod lock;
pub mod network;
pub mod progress;
pub mod quota;
pub mod runner;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

pub use backoff::ThrottleBackoff;
pub use cancel::{StopToken, WaitOutcome};
pub use config::RunnerConfig;
pub use credential::{CredentialProvider, Liveness, LivenessChecker, LivenessVerdict};
pub use error::{FailureClass, SendError, StoreError, TransportError};
pub use lock::{LockManager, LockRecord};
pub use network::{AlwaysOnline, ConnectivityProbe, NetworkMonitor, OnlineWait, SharedFlagProbe};
pub use progress::{NullReporter, Progress, ProgressReporter};
pub use quota::{QuotaInfo, QuotaTracker};
pub use runner::{CampaignRunner, PauseReason, RunStatus, SendOptions, SendReport};
pub use state::{CampaignState, CampaignStatus, CampaignStore};
pub use store::{FileStateStore, MemoryStateStore, StateStore};
pub use transport::{MailTransport, MessageId};
pub use types::{OutcomeKind, SendOutcome, SendTask};
