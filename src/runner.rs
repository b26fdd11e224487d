//! The campaign delivery orchestrator.
//!
//! [`CampaignRunner`] drives an ordered task list to completion, one task
//! at a time: it acquires the cross-context send lease, persists campaign
//! state before and after every task, honors stop requests at every
//! suspension point, blocks on connectivity loss, re-verifies the
//! credential periodically, and classifies transport failures into
//! retry-with-delay, backoff-and-retry, or halt-the-campaign.
//!
//! Sending is strictly sequential by design: the whole point is to stay
//! under provider rate limits, and parallel fan-out would defeat that.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::ThrottleBackoff,
    cancel::{StopToken, WaitOutcome},
    config::RunnerConfig,
    credential::{CredentialProvider, LivenessChecker, LivenessVerdict},
    error::{FailureClass, SendError},
    lock::LockManager,
    network::{ConnectivityProbe, NetworkMonitor, OnlineWait},
    progress::{Progress, ProgressReporter},
    quota::QuotaTracker,
    state::{CampaignState, CampaignStatus, CampaignStore},
    store::StateStore,
    transport::MailTransport,
    types::{SendOutcome, SendTask},
};

/// Why a run stopped short of completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// The caller requested a stop
    UserStop,
    /// Another execution context took over the send lease
    LeaseLost,
    /// Connectivity stayed down past the configured grace window
    NetworkOffline,
    /// The credential expired mid-campaign and needs re-authentication
    CredentialExpired,
}

/// Final state of one `send` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task was delivered
    Completed,
    /// Halted with work outstanding; resumable
    Paused(PauseReason),
    /// Halted by a terminal task failure; the message is the halting error
    Failed(String),
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Identifier of the campaign this run worked
    pub campaign_id: String,
    /// How the run ended
    pub status: RunStatus,
    /// Exactly one outcome per input task, in task order
    pub outcomes: Vec<SendOutcome>,
}

/// Caller-supplied options for a run.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Subject line kept for human-readable resume prompts
    pub subject: Option<String>,
}

/// Result of one task's delivery loop.
enum TaskResult {
    Delivered { retries: u32 },
    Failed { message: String, retries: u32 },
    Cancelled,
    Offline,
    LeaseLost,
}

/// What the last `send` worked on, for `retry_failed`.
#[derive(Debug, Clone)]
struct LastRun {
    tasks: Vec<SendTask>,
    outcomes: Vec<SendOutcome>,
    subject: Option<String>,
}

/// The delivery orchestrator. See the module docs for the state machine.
#[derive(Debug)]
pub struct CampaignRunner {
    config: RunnerConfig,
    owner_id: String,
    transport: Arc<dyn MailTransport>,
    liveness: LivenessChecker,
    monitor: NetworkMonitor,
    campaigns: CampaignStore,
    lock: LockManager,
    quota: QuotaTracker,
    backoff: Mutex<ThrottleBackoff>,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopToken,
    last_run: Mutex<Option<LastRun>>,
}

impl CampaignRunner {
    /// Assemble a runner from its collaborators.
    ///
    /// `owner_id` must be stable per execution context (per tab/process),
    /// not per attempt: it is what lets a context re-acquire its own lease
    /// after a reload.
    #[must_use]
    pub fn new(
        config: RunnerConfig,
        owner_id: impl Into<String>,
        store: Arc<dyn StateStore>,
        transport: Arc<dyn MailTransport>,
        credentials: Arc<dyn CredentialProvider>,
        probe: Arc<dyn ConnectivityProbe>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let lock = LockManager::new(Arc::clone(&store), config.lock_ttl());
        let quota = QuotaTracker::new(Arc::clone(&store), config.daily_quota);
        let campaigns = CampaignStore::new(Arc::clone(&store));
        let monitor = NetworkMonitor::new(probe, config.network_poll(), config.offline_grace());
        let liveness = LivenessChecker::new(credentials, config.reauth_threshold_minutes);
        let backoff = Mutex::new(ThrottleBackoff::new(
            config.backoff_floor(),
            config.backoff_ceiling(),
        ));

        Self {
            config,
            owner_id: owner_id.into(),
            transport,
            liveness,
            monitor,
            campaigns,
            lock,
            quota,
            backoff,
            reporter,
            stop: StopToken::new(),
            last_run: Mutex::new(None),
        }
    }

    /// The quota tracker, for callers that want to surface the estimate.
    #[must_use]
    pub const fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// The persisted interrupted campaign, if any, for resume prompts.
    pub async fn interrupted_campaign(&self) -> Result<Option<CampaignState>, SendError> {
        match self.campaigns.load().await? {
            Some(state) if state.status != CampaignStatus::Completed => Ok(Some(state)),
            _ => Ok(None),
        }
    }

    /// Discard any persisted campaign without sending.
    pub async fn discard_campaign(&self) -> Result<(), SendError> {
        self.campaigns.clear().await?;
        Ok(())
    }

    /// Request a cooperative stop.
    ///
    /// Observed at the per-task checkpoints and inside every wait; an
    /// in-flight transport call is allowed to finish, since aborting it
    /// could record a delivered message as cancelled and corrupt the
    /// resume invariant.
    pub fn stop(&self) {
        info!("Stop requested");
        self.stop.stop();
    }

    /// Drive `tasks` to completion, in index order.
    ///
    /// Returns exactly one [`SendOutcome`] per input task. Individual task
    /// failures never surface as errors here; only precondition failures
    /// do (empty list, lease held elsewhere, dead credential at start).
    pub async fn send(
        &self,
        tasks: Vec<SendTask>,
        options: SendOptions,
    ) -> Result<SendReport, SendError> {
        if tasks.is_empty() {
            return Err(SendError::EmptyCampaign);
        }

        self.stop.reset();

        if !self.lock.try_acquire(&self.owner_id).await? {
            return Err(SendError::AlreadyRunningElsewhere);
        }

        // Everything past the lease acquisition runs inside run_locked so
        // that the release below covers every exit path, store errors
        // included.
        let result = self.run_locked(tasks, options).await;

        if let Err(e) = self.lock.release(&self.owner_id).await {
            error!(error = %e, "Failed to release send lock");
        }

        result
    }

    /// Resume the persisted interrupted campaign.
    ///
    /// Attempts only tasks not yet confirmed sent, ascending by index,
    /// preserving the original subject for display. Fails with
    /// [`SendError::NothingToResume`] when there is nothing outstanding.
    pub async fn resume(&self) -> Result<SendReport, SendError> {
        let Some(state) = self.campaigns.load().await? else {
            return Err(SendError::NothingToResume);
        };
        if state.status == CampaignStatus::Completed {
            return Err(SendError::NothingToResume);
        }

        let remaining = state.remaining_tasks();
        if remaining.is_empty() {
            // Everything already confirmed; nothing left but bookkeeping.
            self.campaigns.clear().await?;
            return Err(SendError::NothingToResume);
        }

        info!(
            campaign_id = %state.id,
            remaining = remaining.len(),
            subject = state.subject.as_deref().unwrap_or(""),
            "Resuming interrupted campaign"
        );

        self.send(
            remaining,
            SendOptions {
                subject: state.subject,
            },
        )
        .await
    }

    /// Re-send the tasks that did not succeed in the most recent run.
    ///
    /// Operates purely on in-memory bookkeeping from the last `send` call
    /// (error, skipped, and cancelled outcomes alike), not on persisted
    /// state; use [`Self::resume`] for cross-session recovery.
    pub async fn retry_failed(&self) -> Result<SendReport, SendError> {
        let (tasks, subject) = {
            let last_run = self.last_run.lock();
            let Some(last) = last_run.as_ref() else {
                return Err(SendError::NothingToRetry);
            };
            let unsent: HashSet<usize> = last
                .outcomes
                .iter()
                .filter(|o| !o.is_success())
                .map(|o| o.index)
                .collect();
            let tasks: Vec<SendTask> = last
                .tasks
                .iter()
                .filter(|t| unsent.contains(&t.index))
                .cloned()
                .collect();
            (tasks, last.subject.clone())
        };

        if tasks.is_empty() {
            return Err(SendError::NothingToRetry);
        }

        info!(task_count = tasks.len(), "Retrying failed tasks from last run");
        self.send(tasks, SendOptions { subject }).await
    }

    async fn run_locked(
        &self,
        mut tasks: Vec<SendTask>,
        options: SendOptions,
    ) -> Result<SendReport, SendError> {
        // A dead credential at start means no sends are attempted at all.
        if self.liveness.verify().await == LivenessVerdict::ReauthRequired {
            return Err(SendError::AuthRequired);
        }

        tasks.sort_by_key(|t| t.index);
        let total = tasks.len();

        match self.quota.load().await {
            Ok(info) if usize::try_from(info.remaining()).unwrap_or(usize::MAX) < total => {
                warn!(
                    remaining = info.remaining(),
                    requested = total,
                    "Campaign may exceed the estimated daily quota"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not load quota estimate"),
        }

        let mut state = CampaignState::new(tasks, options.subject);
        // Persist before sending anything: a campaign that exists in
        // storage with zero progress is distinguishable from one that
        // never started.
        self.campaigns.save(&state).await?;

        info!(campaign_id = %state.id, task_count = total, "Campaign started");

        let tasks = state.tasks.clone();
        let mut outcomes: Vec<SendOutcome> = Vec::with_capacity(total);
        let mut halt: Option<RunStatus> = None;

        for (position, task) in tasks.iter().enumerate() {
            // Checkpoint: stop requested
            if self.stop.is_stopped() {
                cancel_remainder(&mut outcomes, &tasks[position..]);
                halt = Some(RunStatus::Paused(PauseReason::UserStop));
                break;
            }

            // Checkpoint: connectivity
            if !self.monitor.is_online() {
                self.report(
                    task.index,
                    state.sent.len(),
                    total,
                    "Waiting for network connection...",
                );
                match self.monitor.wait_until_online(&self.stop).await {
                    OnlineWait::Online => {
                        // An offline wait can outlive the lease TTL
                        if !self.lock.refresh(&self.owner_id).await? {
                            skip_remainder(&mut outcomes, &tasks[position..], "send lock lost");
                            halt = Some(RunStatus::Paused(PauseReason::LeaseLost));
                            break;
                        }
                    }
                    OnlineWait::Cancelled => {
                        cancel_remainder(&mut outcomes, &tasks[position..]);
                        halt = Some(RunStatus::Paused(PauseReason::UserStop));
                        break;
                    }
                    OnlineWait::GraceExpired => {
                        skip_remainder(&mut outcomes, &tasks[position..], "network offline");
                        halt = Some(RunStatus::Paused(PauseReason::NetworkOffline));
                        break;
                    }
                }
            }

            // Checkpoint: periodic credential liveness + lease refresh
            if position > 0 && position % self.config.liveness_check_every == 0 {
                if !self.lock.refresh(&self.owner_id).await? {
                    warn!(
                        campaign_id = %state.id,
                        position = position,
                        "Send lock lost mid-campaign; halting"
                    );
                    skip_remainder(&mut outcomes, &tasks[position..], "send lock lost");
                    halt = Some(RunStatus::Paused(PauseReason::LeaseLost));
                    break;
                }
                if self.liveness.verify().await == LivenessVerdict::ReauthRequired {
                    warn!(
                        campaign_id = %state.id,
                        position = position,
                        "Credential expired mid-campaign"
                    );
                    skip_remainder(&mut outcomes, &tasks[position..], "credential expired");
                    halt = Some(RunStatus::Paused(PauseReason::CredentialExpired));
                    break;
                }
            }

            self.report(
                task.index,
                state.sent.len(),
                total,
                format!("Sending {} of {total}", position + 1),
            );

            match self.deliver_task(task, state.sent.len(), total).await? {
                TaskResult::Delivered { retries } => {
                    state.record_success(task.index);
                    outcomes.push(SendOutcome::success(task.index, retries));

                    // The quota estimate is best-effort; a failed write
                    // must not halt a healthy campaign.
                    if let Err(e) = self.quota.record_send().await {
                        warn!(error = %e, "Failed to update quota estimate");
                    }
                    self.campaigns.save(&state).await?;

                    self.report(
                        task.index,
                        state.sent.len(),
                        total,
                        format!("Sent {} of {total}", state.sent.len()),
                    );

                    if position + 1 < total {
                        // Fixed spacing between tasks; a stop during the
                        // delay is observed at the next checkpoint.
                        let _ = self.stop.sleep(self.config.inter_task_delay()).await;
                    }
                }
                TaskResult::Failed { message, retries } => {
                    error!(
                        campaign_id = %state.id,
                        index = task.index,
                        recipient = %task.recipient,
                        error = %message,
                        "Terminal delivery failure; halting campaign"
                    );
                    state.record_failure(task.index);
                    outcomes.push(SendOutcome::error(task.index, message.clone(), retries));
                    // A terminal failure usually signals a systemic
                    // problem, not a per-recipient defect; the rest of the
                    // campaign is halted rather than skipped around.
                    skip_remainder(&mut outcomes, &tasks[position + 1..], "blocked by prior failure");
                    halt = Some(RunStatus::Failed(message));
                    break;
                }
                TaskResult::Cancelled => {
                    outcomes.push(SendOutcome::cancelled(task.index));
                    cancel_remainder(&mut outcomes, &tasks[position + 1..]);
                    halt = Some(RunStatus::Paused(PauseReason::UserStop));
                    break;
                }
                TaskResult::Offline => {
                    skip_remainder(&mut outcomes, &tasks[position..], "network offline");
                    halt = Some(RunStatus::Paused(PauseReason::NetworkOffline));
                    break;
                }
                TaskResult::LeaseLost => {
                    warn!(
                        campaign_id = %state.id,
                        index = task.index,
                        "Send lock lost during a wait; halting"
                    );
                    skip_remainder(&mut outcomes, &tasks[position..], "send lock lost");
                    halt = Some(RunStatus::Paused(PauseReason::LeaseLost));
                    break;
                }
            }
        }

        let status = if let Some(status) = halt {
            state.status = CampaignStatus::Paused;
            // After a takeover the persisted record belongs to the new
            // lease holder; writing over it would clobber their progress.
            if status != RunStatus::Paused(PauseReason::LeaseLost) {
                self.campaigns.save(&state).await?;
            }
            status
        } else {
            state.status = CampaignStatus::Completed;
            // Campaign is done; nothing to resume.
            self.campaigns.clear().await?;
            RunStatus::Completed
        };

        self.report_final(&state, total, &status);
        info!(campaign_id = %state.id, status = ?status, "Campaign run finished");

        *self.last_run.lock() = Some(LastRun {
            tasks: state.tasks.clone(),
            outcomes: outcomes.clone(),
            subject: state.subject.clone(),
        });

        Ok(SendReport {
            campaign_id: state.id,
            status,
            outcomes,
        })
    }

    /// The per-task delivery loop: up to `max_attempts` transport calls,
    /// with throttling backoff that never consumes an attempt. The lease
    /// is re-asserted after every wait long enough to approach its TTL.
    async fn deliver_task(
        &self,
        task: &SendTask,
        done: usize,
        total: usize,
    ) -> Result<TaskResult, SendError> {
        let mut attempts: u32 = 0;

        loop {
            if self.stop.is_stopped() {
                return Ok(TaskResult::Cancelled);
            }

            if !self.monitor.is_online() {
                match self.monitor.wait_until_online(&self.stop).await {
                    OnlineWait::Online => {
                        if !self.lock.refresh(&self.owner_id).await? {
                            return Ok(TaskResult::LeaseLost);
                        }
                    }
                    OnlineWait::Cancelled => return Ok(TaskResult::Cancelled),
                    OnlineWait::GraceExpired => return Ok(TaskResult::Offline),
                }
            }

            let Some(credential) = self.liveness.provider().credential().await else {
                return Ok(TaskResult::Failed {
                    message: "no credential available".to_string(),
                    retries: attempts,
                });
            };

            match self.transport.send_one(&credential, task).await {
                Ok(message_id) => {
                    debug!(
                        index = task.index,
                        recipient = %task.recipient,
                        message_id = %message_id,
                        "Delivered"
                    );
                    // A success means the provider is no longer throttling.
                    self.backoff.lock().record_success();
                    return Ok(TaskResult::Delivered { retries: attempts });
                }
                Err(e) => match e.class() {
                    FailureClass::RateLimited => {
                        let wait = self.backoff.lock().next_wait();
                        warn!(
                            index = task.index,
                            wait_secs = wait.as_secs(),
                            "Provider throttling; backing off"
                        );
                        self.report(
                            task.index,
                            done,
                            total,
                            format!("Rate limited - waiting {}s", wait.as_secs()),
                        );
                        if self.stop.sleep(wait).await == WaitOutcome::Cancelled {
                            return Ok(TaskResult::Cancelled);
                        }
                        // Backoff windows reach 300s, the full lease TTL;
                        // re-assert ownership before retrying.
                        if !self.lock.refresh(&self.owner_id).await? {
                            return Ok(TaskResult::LeaseLost);
                        }
                        // Retry the same attempt; the counter is untouched.
                    }
                    FailureClass::NonRetryable => {
                        return Ok(TaskResult::Failed {
                            message: e.to_string(),
                            retries: attempts,
                        });
                    }
                    FailureClass::Transient => {
                        attempts += 1;
                        let message = e.to_string();
                        debug!(
                            index = task.index,
                            attempt = attempts,
                            error = %message,
                            "Transient delivery failure"
                        );
                        if attempts >= self.config.max_attempts {
                            return Ok(TaskResult::Failed {
                                message,
                                retries: attempts,
                            });
                        }
                        if self.stop.sleep(self.config.transient_retry_delay()).await
                            == WaitOutcome::Cancelled
                        {
                            return Ok(TaskResult::Cancelled);
                        }
                    }
                },
            }
        }
    }

    fn report(&self, current_index: usize, done: usize, total: usize, status: impl Into<String>) {
        self.reporter
            .report(Progress::new(current_index, done, total, status.into()));
    }

    fn report_final(&self, state: &CampaignState, total: usize, status: &RunStatus) {
        let sent = state.sent.len();
        let line = match status {
            RunStatus::Completed => format!("Campaign complete - {sent} sent"),
            RunStatus::Paused(PauseReason::UserStop) => {
                format!("Stopped - {sent} of {total} sent")
            }
            RunStatus::Paused(PauseReason::LeaseLost) => {
                format!("Stopped - another session took over - {sent} of {total} sent")
            }
            RunStatus::Paused(PauseReason::NetworkOffline) => {
                format!("Paused - network offline - {sent} of {total} sent")
            }
            RunStatus::Paused(PauseReason::CredentialExpired) => {
                "Authentication required - please sign in again".to_string()
            }
            RunStatus::Failed(message) => {
                format!("Stopped after failure: {message} - {sent} of {total} sent")
            }
        };
        self.report(sent.saturating_sub(1), sent, total, line);
    }
}

/// Mark `rest` as cancelled by a stop request.
fn cancel_remainder(outcomes: &mut Vec<SendOutcome>, rest: &[SendTask]) {
    for task in rest {
        outcomes.push(SendOutcome::cancelled(task.index));
    }
}

/// Mark `rest` as skipped with `reason`.
fn skip_remainder(outcomes: &mut Vec<SendOutcome>, rest: &[SendTask], reason: &str) {
    for task in rest {
        outcomes.push(SendOutcome::skipped(task.index, reason));
    }
}
