use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::PipelineConfig;
use crate::workflows::loan::auth::{AuthError, CallerAuthenticator};
use crate::workflows::loan::decision::{DecisionSource, DocumentChecks};
use crate::workflows::loan::domain::{
    AgentActivity, ApplicantSnapshot, ApplicationId, LoanApplication, LoanRequest, UserId,
};
use crate::workflows::loan::repository::{
    CancelOutcome, ChangeNotifier, LoanRepository, NotifyError, RepositoryError, StageCommit,
};
use crate::workflows::loan::scheduler::{QueueError, ScheduledStage, StageQueue};
use crate::workflows::loan::service::LoanPipelineService;
use crate::workflows::loan::stages::PipelineStage;

pub(super) const TOKEN: &str = "token-asha";
pub(super) const USER: &str = "user-asha";

pub(super) fn snapshot(monthly_income: u64) -> ApplicantSnapshot {
    ApplicantSnapshot {
        monthly_income,
        employment_type: "Salaried".to_string(),
        pan_number: Some("ABCDE1234F".to_string()),
        aadhaar_number: Some("1234-5678-9012".to_string()),
    }
}

pub(super) fn request() -> LoanRequest {
    LoanRequest {
        amount: 2_000_000,
        purpose: "Home Renovation".to_string(),
        tenure_months: 12,
        user_data: snapshot(50_000),
    }
}

/// Delays short enough that a whole pipeline finishes within a test.
pub(super) fn fast_config() -> PipelineConfig {
    PipelineConfig {
        intake_delay_ms: 1,
        stage_delay_ms: 1,
        retry_delay_ms: 1,
        stalled_after_ms: 60_000,
    }
}

/// Delays long enough that no scheduled stage fires during a test.
pub(super) fn frozen_config() -> PipelineConfig {
    PipelineConfig {
        intake_delay_ms: 60_000,
        stage_delay_ms: 60_000,
        retry_delay_ms: 60_000,
        stalled_after_ms: 60_000,
    }
}

/// Poll until the check passes or the limit elapses.
pub(super) async fn wait_until(limit: Duration, check: impl Fn() -> bool) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < limit {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[derive(Default)]
struct Tables {
    applications: HashMap<ApplicationId, LoanApplication>,
    activities: Vec<AgentActivity>,
}

/// In-memory double for the two logical tables; one lock makes the
/// create/commit units atomic the way a database transaction would.
#[derive(Default)]
pub(super) struct MemoryRepository {
    inner: Mutex<Tables>,
}

impl LoanRepository for MemoryRepository {
    fn create(
        &self,
        application: LoanApplication,
        opening: AgentActivity,
    ) -> Result<LoanApplication, RepositoryError> {
        let mut tables = self.inner.lock().expect("repository mutex poisoned");
        if tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.activities.push(opening);
        tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError> {
        let tables = self.inner.lock().expect("repository mutex poisoned");
        Ok(tables.applications.get(id).cloned())
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<LoanApplication>, RepositoryError> {
        let tables = self.inner.lock().expect("repository mutex poisoned");
        let mut applications: Vec<LoanApplication> = tables
            .applications
            .values()
            .filter(|application| application.user_id == *user)
            .cloned()
            .collect();
        applications.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        Ok(applications)
    }

    fn activities(&self, id: &ApplicationId) -> Result<Vec<AgentActivity>, RepositoryError> {
        let tables = self.inner.lock().expect("repository mutex poisoned");
        Ok(tables
            .activities
            .iter()
            .filter(|activity| activity.application_id == *id)
            .cloned()
            .collect())
    }

    fn commit_stage(&self, commit: StageCommit) -> Result<LoanApplication, RepositoryError> {
        let mut tables = self.inner.lock().expect("repository mutex poisoned");
        let application = tables
            .applications
            .get_mut(&commit.application_id)
            .ok_or(RepositoryError::NotFound)?;
        if application.status != commit.expected_status {
            return Err(RepositoryError::WrongStatus {
                expected: commit.expected_status,
                found: application.status,
            });
        }

        application.status = commit.to_status;
        if let Some(score) = commit.credit_score {
            application.credit_score = Some(score);
        }
        if let Some(eligibility) = commit.eligibility.clone() {
            application.eligibility_result = Some(eligibility);
        }
        application.updated_at = commit.at;
        let updated = application.clone();
        tables.activities.push(commit.activity);
        Ok(updated)
    }

    fn cancel(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<CancelOutcome, RepositoryError> {
        let mut tables = self.inner.lock().expect("repository mutex poisoned");
        let application = tables
            .applications
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if application.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(application.clone()));
        }
        application.status = crate::workflows::loan::domain::LoanStatus::Cancelled;
        application.updated_at = at;
        Ok(CancelOutcome::Cancelled(application.clone()))
    }

    fn stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<LoanApplication>, RepositoryError> {
        let tables = self.inner.lock().expect("repository mutex poisoned");
        let mut stalled: Vec<LoanApplication> = tables
            .applications
            .values()
            .filter(|application| !application.status.is_terminal())
            .filter(|application| {
                let latest = tables
                    .activities
                    .iter()
                    .filter(|activity| activity.application_id == application.id)
                    .map(|activity| activity.created_at)
                    .max()
                    .unwrap_or(application.created_at);
                latest < cutoff
            })
            .cloned()
            .collect();
        stalled.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stalled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Claimed,
    Done,
    Cancelled,
}

struct TaskEntry {
    task: ScheduledStage,
    state: TaskState,
}

/// In-memory stage queue double with the claim/complete/release life
/// cycle the contract requires.
#[derive(Default)]
pub(super) struct MemoryQueue {
    tasks: Mutex<HashMap<(ApplicationId, PipelineStage), TaskEntry>>,
}

impl StageQueue for MemoryQueue {
    fn enqueue(&self, task: ScheduledStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let key = (task.application_id.clone(), task.stage);
        if tasks.contains_key(&key) {
            return Err(QueueError::Duplicate);
        }
        tasks.insert(
            key,
            TaskEntry {
                task,
                state: TaskState::Pending,
            },
        );
        Ok(())
    }

    fn claim(
        &self,
        id: &ApplicationId,
        stage: PipelineStage,
    ) -> Result<Option<ScheduledStage>, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        match tasks.get_mut(&(id.clone(), stage)) {
            Some(entry) if entry.state == TaskState::Pending => {
                entry.state = TaskState::Claimed;
                Ok(Some(entry.task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn complete(&self, id: &ApplicationId, stage: PipelineStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        if let Some(entry) = tasks.get_mut(&(id.clone(), stage)) {
            entry.state = TaskState::Done;
        }
        Ok(())
    }

    fn release(&self, task: ScheduledStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let key = (task.application_id.clone(), task.stage);
        match tasks.get_mut(&key) {
            Some(entry) => {
                entry.task = task;
                entry.state = TaskState::Pending;
                Ok(())
            }
            None => Err(QueueError::Unavailable(
                "released task was never enqueued".to_string(),
            )),
        }
    }

    fn cancel_all(&self, id: &ApplicationId) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        for ((application_id, _), entry) in tasks.iter_mut() {
            if application_id == id && entry.state == TaskState::Pending {
                entry.state = TaskState::Cancelled;
            }
        }
        Ok(())
    }

    fn recover(&self) -> Result<Vec<ScheduledStage>, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let mut pending = Vec::new();
        for entry in tasks.values_mut() {
            if entry.state == TaskState::Claimed {
                entry.state = TaskState::Pending;
            }
            if entry.state == TaskState::Pending {
                pending.push(entry.task.clone());
            }
        }
        pending.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        Ok(pending)
    }
}

/// Captures emitted change events for assertions.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    applications: Mutex<Vec<LoanApplication>>,
    activities: Mutex<Vec<AgentActivity>>,
}

impl RecordingNotifier {
    pub(super) fn application_events(&self) -> Vec<LoanApplication> {
        self.applications.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn activity_events(&self) -> Vec<AgentActivity> {
        self.activities.lock().expect("notifier mutex poisoned").clone()
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn application_changed(&self, application: &LoanApplication) -> Result<(), NotifyError> {
        self.applications
            .lock()
            .expect("notifier mutex poisoned")
            .push(application.clone());
        Ok(())
    }

    fn activity_recorded(&self, activity: &AgentActivity) -> Result<(), NotifyError> {
        self.activities
            .lock()
            .expect("notifier mutex poisoned")
            .push(activity.clone());
        Ok(())
    }
}

/// Token table standing in for the external auth collaborator.
pub(super) struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    pub(super) fn with_tokens(entries: &[(&str, &str)]) -> Self {
        let tokens = entries
            .iter()
            .map(|(token, user)| ((*token).to_string(), UserId((*user).to_string())))
            .collect();
        Self { tokens }
    }

    pub(super) fn single() -> Self {
        Self::with_tokens(&[(TOKEN, USER)])
    }
}

impl CallerAuthenticator for StaticTokenAuthenticator {
    fn authenticate(&self, bearer_token: &str) -> Result<UserId, AuthError> {
        self.tokens
            .get(bearer_token)
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

/// Decision source with pinned values so pipelines replay exactly.
pub(super) struct ScriptedDecisions {
    pub(super) rate: f64,
    pub(super) score: u16,
    pub(super) checks: DocumentChecks,
}

impl Default for ScriptedDecisions {
    fn default() -> Self {
        Self {
            rate: 11.25,
            score: 700,
            checks: DocumentChecks {
                pan_verified: true,
                aadhaar_verified: true,
                bureau_check_passed: true,
            },
        }
    }
}

impl ScriptedDecisions {
    pub(super) fn with_score(score: u16) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }
}

impl DecisionSource for ScriptedDecisions {
    fn interest_rate(&self) -> f64 {
        self.rate
    }

    fn document_checks(&self, _applicant: &ApplicantSnapshot) -> DocumentChecks {
        self.checks
    }

    fn credit_score(&self) -> u16 {
        self.score
    }
}

/// Repository that fails a set number of stage commits before delegating,
/// for the scheduler's retry path.
#[derive(Default)]
pub(super) struct FlakyRepository {
    inner: MemoryRepository,
    commit_failures: std::sync::atomic::AtomicUsize,
}

impl FlakyRepository {
    pub(super) fn failing(commits: usize) -> Self {
        Self {
            inner: MemoryRepository::default(),
            commit_failures: std::sync::atomic::AtomicUsize::new(commits),
        }
    }
}

impl LoanRepository for FlakyRepository {
    fn create(
        &self,
        application: LoanApplication,
        opening: AgentActivity,
    ) -> Result<LoanApplication, RepositoryError> {
        self.inner.create(application, opening)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<LoanApplication>, RepositoryError> {
        self.inner.for_user(user)
    }

    fn activities(&self, id: &ApplicationId) -> Result<Vec<AgentActivity>, RepositoryError> {
        self.inner.activities(id)
    }

    fn commit_stage(&self, commit: StageCommit) -> Result<LoanApplication, RepositoryError> {
        let failed = self
            .commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(RepositoryError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }
        self.inner.commit_stage(commit)
    }

    fn cancel(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<CancelOutcome, RepositoryError> {
        self.inner.cancel(id, at)
    }

    fn stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<LoanApplication>, RepositoryError> {
        self.inner.stalled(cutoff)
    }
}

pub(super) type MemoryService = LoanPipelineService<MemoryRepository, MemoryQueue, RecordingNotifier>;

pub(super) fn build_service(
    config: PipelineConfig,
) -> (
    Arc<MemoryService>,
    Arc<MemoryRepository>,
    Arc<MemoryQueue>,
    Arc<RecordingNotifier>,
) {
    build_service_with(config, Arc::new(ScriptedDecisions::default()))
}

pub(super) fn build_service_with(
    config: PipelineConfig,
    decisions: Arc<dyn DecisionSource>,
) -> (
    Arc<MemoryService>,
    Arc<MemoryRepository>,
    Arc<MemoryQueue>,
    Arc<RecordingNotifier>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let queue = Arc::new(MemoryQueue::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = Arc::new(LoanPipelineService::new(
        repository.clone(),
        queue.clone(),
        notifier.clone(),
        Arc::new(StaticTokenAuthenticator::single()),
        decisions,
        config,
    ));
    (service, repository, queue, notifier)
}
