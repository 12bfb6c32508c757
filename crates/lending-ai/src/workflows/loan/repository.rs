use chrono::{DateTime, Utc};

use super::domain::{
    AgentActivity, ApplicationId, EligibilityResult, LoanApplication, LoanStatus, UserId,
};

/// Storage abstraction over the two logical tables (applications and
/// activities). The pipeline never touches storage except through this
/// contract, and the write methods are required to serialize per
/// application id: `create` and `commit_stage` are each an all-or-nothing
/// unit covering one row write plus one activity append.
pub trait LoanRepository: Send + Sync {
    /// Persist a freshly submitted application together with its opening
    /// master activity. Fails with [`RepositoryError::Conflict`] if the id
    /// is already taken; neither table is touched on failure.
    fn create(
        &self,
        application: LoanApplication,
        opening: AgentActivity,
    ) -> Result<LoanApplication, RepositoryError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError>;

    /// Applications owned by a user, newest first.
    fn for_user(&self, user: &UserId) -> Result<Vec<LoanApplication>, RepositoryError>;

    /// Audit trail for an application, oldest first.
    fn activities(&self, id: &ApplicationId) -> Result<Vec<AgentActivity>, RepositoryError>;

    /// Apply one stage's output atomically: the status transition
    /// (conditional on the expected predecessor status), the optional
    /// credit/eligibility patch, and the activity append either all commit
    /// or none do. A status mismatch fails with
    /// [`RepositoryError::WrongStatus`] and leaves both tables untouched.
    fn commit_stage(&self, commit: StageCommit) -> Result<LoanApplication, RepositoryError>;

    /// Transition a non-terminal application to [`LoanStatus::Cancelled`].
    /// If a terminal status already committed the call is a no-op reporting
    /// the stored record.
    fn cancel(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<CancelOutcome, RepositoryError>;

    /// Non-terminal applications whose latest activity is older than the
    /// cutoff; the operational stuck-pipeline query.
    fn stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<LoanApplication>, RepositoryError>;
}

/// One stage's writes, committed as a unit.
#[derive(Debug, Clone)]
pub struct StageCommit {
    pub application_id: ApplicationId,
    pub expected_status: LoanStatus,
    pub to_status: LoanStatus,
    pub credit_score: Option<u16>,
    pub eligibility: Option<EligibilityResult>,
    pub activity: AgentActivity,
    pub at: DateTime<Utc>,
}

/// Result of an abort attempt against the store.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(LoanApplication),
    AlreadyTerminal(LoanApplication),
}

impl CancelOutcome {
    pub fn application(&self) -> &LoanApplication {
        match self {
            CancelOutcome::Cancelled(application) => application,
            CancelOutcome::AlreadyTerminal(application) => application,
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("application is in status {found} but the write expected {expected}")]
    WrongStatus {
        expected: LoanStatus,
        found: LoanStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound change-event hook consumed by the dashboard/real-time
/// collaborator. Events are keyed by the user and application ids carried
/// on the records; the delivery transport is an external concern.
pub trait ChangeNotifier: Send + Sync {
    fn application_changed(&self, application: &LoanApplication) -> Result<(), NotifyError>;
    fn activity_recorded(&self, activity: &AgentActivity) -> Result<(), NotifyError>;
}

/// Notification dispatch error. Never fails the pipeline; the orchestrator
/// logs and moves on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
