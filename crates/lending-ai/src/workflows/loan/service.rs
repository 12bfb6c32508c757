use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration as TimeDelta, Utc};
use tracing::{error, info, warn};

use super::auth::{AuthError, CallerAuthenticator};
use super::decision::DecisionSource;
use super::domain::{
    ActivityId, ActivityStatus, AgentActivity, AgentKind, ApplicationId, LoanApplication,
    LoanRequest, LoanStatus, SubmissionReceipt,
};
use super::intake::{SubmissionGuard, ValidationError};
use super::repository::{
    CancelOutcome, ChangeNotifier, LoanRepository, RepositoryError, StageCommit,
};
use super::scheduler::{QueueError, ScheduledStage, StageQueue};
use super::stages::{self, PipelineStage};
use crate::config::PipelineConfig;

/// Acknowledgement sent back to the submitting caller.
pub const SUBMISSION_ACK: &str =
    "Loan application initiated. Our AI agents are processing your request.";

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static ACTIVITY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("loan-{id:06}"))
}

fn next_activity_id() -> ActivityId {
    let id = ACTIVITY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ActivityId(format!("act-{id:06}"))
}

/// Service composing the submission guard, repository, stage queue,
/// notifier, authenticator, and decision source. Public methods are the
/// operations the HTTP surface exposes; the scheduling internals live on
/// [`PipelineCore`] so spawned timer tasks can hold the pipeline without
/// the auth layer.
pub struct LoanPipelineService<R, Q, N> {
    guard: SubmissionGuard,
    auth: Arc<dyn CallerAuthenticator>,
    core: Arc<PipelineCore<R, Q, N>>,
}

struct PipelineCore<R, Q, N> {
    repository: Arc<R>,
    queue: Arc<Q>,
    notifier: Arc<N>,
    decisions: Arc<dyn DecisionSource>,
    config: PipelineConfig,
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("application not found")]
    NotFound,
    #[error(
        "stage {stage} cannot run on {application_id}: status is {found}, requires {expected}"
    )]
    InvalidTransition {
        application_id: ApplicationId,
        stage: PipelineStage,
        expected: LoanStatus,
        found: LoanStatus,
    },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<RepositoryError> for PipelineError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => PipelineError::NotFound,
            other => PipelineError::Persistence(other.to_string()),
        }
    }
}

impl From<QueueError> for PipelineError {
    fn from(value: QueueError) -> Self {
        PipelineError::Persistence(value.to_string())
    }
}

/// What happened when a claimed stage was executed.
enum StageRun {
    Committed(LoanApplication),
    Aborted,
}

impl<R, Q, N> LoanPipelineService<R, Q, N>
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        queue: Arc<Q>,
        notifier: Arc<N>,
        auth: Arc<dyn CallerAuthenticator>,
        decisions: Arc<dyn DecisionSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            guard: SubmissionGuard,
            auth,
            core: Arc::new(PipelineCore {
                repository,
                queue,
                notifier,
                decisions,
                config,
            }),
        }
    }

    /// Accept a submission: authenticate, validate, create the application
    /// in `Initiated` together with its master activity, and schedule the
    /// sales stage. Returns immediately; the caller never blocks on
    /// downstream stages. Must run inside a tokio runtime; the stage
    /// chain is driven by spawned timer tasks.
    pub fn submit(
        &self,
        bearer_token: &str,
        request: LoanRequest,
    ) -> Result<SubmissionReceipt, PipelineError> {
        let user = self.auth.authenticate(bearer_token)?;
        let request = self.guard.screen(request)?;

        let now = Utc::now();
        let id = next_application_id();
        let application = LoanApplication {
            id: id.clone(),
            user_id: user,
            amount: request.amount,
            purpose: request.purpose,
            tenure_months: request.tenure_months,
            status: LoanStatus::Initiated,
            applicant: request.user_data,
            credit_score: None,
            eligibility_result: None,
            created_at: now,
            updated_at: now,
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "message".to_string(),
            "Master Agent received loan application".into(),
        );
        let opening = AgentActivity {
            id: next_activity_id(),
            application_id: id.clone(),
            agent: AgentKind::Master,
            action: "Application initiated".to_string(),
            status: ActivityStatus::Success,
            metadata,
            created_at: now,
        };

        let stored = self.core.repository.create(application, opening.clone())?;
        self.core.notify_application(&stored);
        self.core.notify_activity(&opening);
        info!(application_id = %stored.id, amount = stored.amount, "loan application initiated");

        PipelineCore::schedule(&self.core, stored.id.clone(), PipelineStage::first());

        Ok(SubmissionReceipt {
            application_id: stored.id,
            message: SUBMISSION_ACK.to_string(),
        })
    }

    /// Re-drive every unfinished scheduled stage, reverting stale claims.
    /// Called once at startup so a restart resumes in-flight pipelines.
    pub fn recover(&self) -> Result<usize, PipelineError> {
        let pending = self.core.queue.recover()?;
        let count = pending.len();
        for task in pending {
            PipelineCore::spawn_driver(&self.core, task);
        }
        if count > 0 {
            info!(tasks = count, "recovered scheduled stages");
        }
        Ok(count)
    }

    /// Abort an application: cancel queued stages and transition any
    /// non-terminal record to `Cancelled`. Idempotent: if a terminal
    /// status already committed, the abort loses the race and is a no-op.
    pub fn cancel(
        &self,
        bearer_token: &str,
        id: &ApplicationId,
    ) -> Result<CancelOutcome, PipelineError> {
        let user = self.auth.authenticate(bearer_token)?;
        let application = self.owned(&user, id)?;

        self.core.queue.cancel_all(&application.id)?;
        let outcome = self.core.repository.cancel(&application.id, Utc::now())?;
        match &outcome {
            CancelOutcome::Cancelled(cancelled) => {
                self.core.notify_application(cancelled);
                info!(application_id = %cancelled.id, "application cancelled");
            }
            CancelOutcome::AlreadyTerminal(existing) => {
                info!(
                    application_id = %existing.id,
                    status = %existing.status,
                    "abort after terminal commit; nothing to do"
                );
            }
        }
        Ok(outcome)
    }

    /// The caller's applications, newest first.
    pub fn applications(&self, bearer_token: &str) -> Result<Vec<LoanApplication>, PipelineError> {
        let user = self.auth.authenticate(bearer_token)?;
        Ok(self.core.repository.for_user(&user)?)
    }

    /// One owned application.
    pub fn application(
        &self,
        bearer_token: &str,
        id: &ApplicationId,
    ) -> Result<LoanApplication, PipelineError> {
        let user = self.auth.authenticate(bearer_token)?;
        self.owned(&user, id)
    }

    /// Audit trail for an owned application, oldest first.
    pub fn activities(
        &self,
        bearer_token: &str,
        id: &ApplicationId,
    ) -> Result<Vec<AgentActivity>, PipelineError> {
        let user = self.auth.authenticate(bearer_token)?;
        let application = self.owned(&user, id)?;
        Ok(self.core.repository.activities(&application.id)?)
    }

    /// Operational query: non-terminal applications whose latest activity
    /// is older than the configured stall threshold.
    pub fn stalled(&self, bearer_token: &str) -> Result<Vec<LoanApplication>, PipelineError> {
        self.auth.authenticate(bearer_token)?;
        let cutoff =
            Utc::now() - TimeDelta::milliseconds(self.core.config.stalled_after_ms as i64);
        Ok(self.core.repository.stalled(cutoff)?)
    }

    fn owned(
        &self,
        user: &super::domain::UserId,
        id: &ApplicationId,
    ) -> Result<LoanApplication, PipelineError> {
        let application = self
            .core
            .repository
            .fetch(id)?
            .ok_or(PipelineError::NotFound)?;
        // Records owned by someone else read as absent.
        if application.user_id != *user {
            return Err(PipelineError::NotFound);
        }
        Ok(application)
    }
}

impl<R, Q, N> PipelineCore<R, Q, N>
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    /// Record the next-stage pointer and start its timer. A duplicate key
    /// means the stage is already owed an execution; everything else is an
    /// operational failure surfaced by the stalled query.
    fn schedule(core: &Arc<Self>, application_id: ApplicationId, stage: PipelineStage) {
        let delay = stage.delay(&core.config);
        let run_at = Utc::now() + TimeDelta::milliseconds(delay.as_millis() as i64);
        let task = ScheduledStage {
            application_id,
            stage,
            run_at,
            attempt: 0,
        };

        match core.queue.enqueue(task.clone()) {
            Ok(()) => Self::spawn_driver(core, task),
            Err(QueueError::Duplicate) => {
                warn!(
                    application_id = %task.application_id,
                    stage = %task.stage,
                    "stage already scheduled; skipping duplicate"
                );
            }
            Err(err) => {
                error!(
                    application_id = %task.application_id,
                    stage = %task.stage,
                    error = %err,
                    "failed to schedule stage"
                );
            }
        }
    }

    fn spawn_driver(core: &Arc<Self>, task: ScheduledStage) {
        let core = Arc::clone(core);
        tokio::spawn(async move {
            let wait = (task.run_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            Self::dispatch(&core, task);
        });
    }

    /// Claim and run one scheduled stage, then chain the successor. The
    /// queue claim keeps concurrent timers from double-running a stage;
    /// the repository's conditional commit backstops it.
    fn dispatch(core: &Arc<Self>, task: ScheduledStage) {
        let claimed = match core.queue.claim(&task.application_id, task.stage) {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return,
            Err(err) => {
                error!(
                    application_id = %task.application_id,
                    stage = %task.stage,
                    error = %err,
                    "queue claim failed"
                );
                return;
            }
        };

        match core.execute(&claimed) {
            Ok(StageRun::Committed(updated)) => {
                core.retire(&claimed);
                match claimed.stage.next() {
                    Some(next) if !updated.status.is_terminal() => {
                        Self::schedule(core, claimed.application_id.clone(), next);
                    }
                    _ => {
                        info!(
                            application_id = %updated.id,
                            status = %updated.status,
                            "pipeline reached terminal status"
                        );
                    }
                }
            }
            Ok(StageRun::Aborted) => {
                core.retire(&claimed);
                info!(
                    application_id = %claimed.application_id,
                    stage = %claimed.stage,
                    "stage skipped after abort"
                );
            }
            Err(PipelineError::InvalidTransition {
                application_id,
                stage,
                expected,
                found,
            }) => {
                // Out-of-order dispatch is a defect, not a retry case: the
                // store was not touched and the task is retired.
                core.retire(&claimed);
                error!(
                    application_id = %application_id,
                    stage = %stage,
                    expected = %expected,
                    found = %found,
                    "invalid stage transition"
                );
            }
            Err(err) => {
                warn!(
                    application_id = %claimed.application_id,
                    stage = %claimed.stage,
                    attempt = claimed.attempt,
                    error = %err,
                    "stage failed; scheduling retry"
                );
                let run_at =
                    Utc::now() + TimeDelta::milliseconds(core.config.retry_delay_ms as i64);
                let retry = claimed.retried(run_at);
                match core.queue.release(retry.clone()) {
                    Ok(()) => Self::spawn_driver(core, retry),
                    Err(release_err) => {
                        error!(
                            application_id = %claimed.application_id,
                            stage = %claimed.stage,
                            error = %release_err,
                            "failed to release stage for retry"
                        );
                    }
                }
            }
        }
    }

    /// Run one stage handler and commit its output atomically.
    fn execute(&self, task: &ScheduledStage) -> Result<StageRun, PipelineError> {
        let application = self
            .repository
            .fetch(&task.application_id)?
            .ok_or(PipelineError::NotFound)?;

        if application.status == LoanStatus::Cancelled {
            return Ok(StageRun::Aborted);
        }

        let expected = task.stage.expected_status();
        if application.status != expected {
            return Err(PipelineError::InvalidTransition {
                application_id: task.application_id.clone(),
                stage: task.stage,
                expected,
                found: application.status,
            });
        }

        let outcome = stages::evaluate(task.stage, &application, self.decisions.as_ref());
        let now = Utc::now();
        let activity = AgentActivity {
            id: next_activity_id(),
            application_id: task.application_id.clone(),
            agent: task.stage.agent(),
            action: outcome.action,
            status: ActivityStatus::Success,
            metadata: outcome.metadata,
            created_at: now,
        };

        let updated = self
            .repository
            .commit_stage(StageCommit {
                application_id: task.application_id.clone(),
                expected_status: expected,
                to_status: outcome.to_status,
                credit_score: outcome.credit_score,
                eligibility: outcome.eligibility,
                activity: activity.clone(),
                at: now,
            })
            .map_err(|err| match err {
                RepositoryError::WrongStatus { expected, found } => {
                    PipelineError::InvalidTransition {
                        application_id: task.application_id.clone(),
                        stage: task.stage,
                        expected,
                        found,
                    }
                }
                other => PipelineError::from(other),
            })?;

        self.notify_activity(&activity);
        self.notify_application(&updated);
        info!(
            application_id = %updated.id,
            stage = %task.stage,
            status = %updated.status,
            "stage committed"
        );
        Ok(StageRun::Committed(updated))
    }

    fn retire(&self, task: &ScheduledStage) {
        if let Err(err) = self.queue.complete(&task.application_id, task.stage) {
            error!(
                application_id = %task.application_id,
                stage = %task.stage,
                error = %err,
                "failed to retire queue task"
            );
        }
    }

    fn notify_application(&self, application: &LoanApplication) {
        if let Err(err) = self.notifier.application_changed(application) {
            warn!(
                application_id = %application.id,
                error = %err,
                "application change notification dropped"
            );
        }
    }

    fn notify_activity(&self, activity: &AgentActivity) {
        if let Err(err) = self.notifier.activity_recorded(activity) {
            warn!(
                application_id = %activity.application_id,
                error = %err,
                "activity notification dropped"
            );
        }
    }
}
