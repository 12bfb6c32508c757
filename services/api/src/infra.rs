use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use lending_ai::workflows::loan::{
    AgentActivity, ApplicationId, AuthError, CallerAuthenticator, CancelOutcome, ChangeNotifier,
    LoanApplication, LoanRepository, LoanStatus, NotifyError, PipelineStage, QueueError,
    RepositoryError, ScheduledStage, StageCommit, StageQueue, UserId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Tables {
    applications: HashMap<ApplicationId, LoanApplication>,
    activities: Vec<AgentActivity>,
}

/// Process-local store backing both logical tables under one lock so the
/// stage commit stays atomic. A durable deployment swaps this for a
/// database-backed implementation of the same contract.
#[derive(Default)]
pub(crate) struct InMemoryLoanRepository {
    inner: Mutex<Tables>,
}

impl LoanRepository for InMemoryLoanRepository {
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
        application.status = LoanStatus::Cancelled;
        application.updated_at = at;
        Ok(CancelOutcome::Cancelled(application.clone()))
    }

    fn stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<LoanApplication>, RepositoryError> {
        let tables = self.inner.lock().expect("repository mutex poisoned");
        Ok(tables
            .applications
            .values()
            .filter(|application| !application.status.is_terminal())
            .filter(|application| {
                tables
                    .activities
                    .iter()
                    .filter(|activity| activity.application_id == application.id)
                    .map(|activity| activity.created_at)
                    .max()
                    .unwrap_or(application.created_at)
                    < cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Claimed,
    Done,
    Cancelled,
}

/// Process-local stage queue; honors the claim/complete/release life cycle
/// within the process lifetime. Durability across restarts comes from a
/// database-backed implementation of the same contract.
#[derive(Default)]
pub(crate) struct InMemoryStageQueue {
    tasks: Mutex<HashMap<(ApplicationId, PipelineStage), (ScheduledStage, TaskState)>>,
}

impl StageQueue for InMemoryStageQueue {
    fn enqueue(&self, task: ScheduledStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let key = (task.application_id.clone(), task.stage);
        if tasks.contains_key(&key) {
            return Err(QueueError::Duplicate);
        }
        tasks.insert(key, (task, TaskState::Pending));
        Ok(())
    }

    fn claim(
        &self,
        id: &ApplicationId,
        stage: PipelineStage,
    ) -> Result<Option<ScheduledStage>, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        match tasks.get_mut(&(id.clone(), stage)) {
            Some((task, state)) if *state == TaskState::Pending => {
                *state = TaskState::Claimed;
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn complete(&self, id: &ApplicationId, stage: PipelineStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        if let Some((_, state)) = tasks.get_mut(&(id.clone(), stage)) {
            *state = TaskState::Done;
        }
        Ok(())
    }

    fn release(&self, task: ScheduledStage) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let key = (task.application_id.clone(), task.stage);
        match tasks.get_mut(&key) {
            Some(entry) => {
                *entry = (task, TaskState::Pending);
                Ok(())
            }
            None => Err(QueueError::Unavailable(
                "released task was never enqueued".to_string(),
            )),
        }
    }

    fn cancel_all(&self, id: &ApplicationId) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        for ((application_id, _), (_, state)) in tasks.iter_mut() {
            if application_id == id && *state == TaskState::Pending {
                *state = TaskState::Cancelled;
            }
        }
        Ok(())
    }

    fn recover(&self) -> Result<Vec<ScheduledStage>, QueueError> {
        let mut tasks = self.tasks.lock().expect("queue mutex poisoned");
        let mut pending = Vec::new();
        for (task, state) in tasks.values_mut() {
            if *state == TaskState::Claimed {
                *state = TaskState::Pending;
            }
            if *state == TaskState::Pending {
                pending.push(task.clone());
            }
        }
        pending.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        Ok(pending)
    }
}

/// Change-event sink that logs instead of pushing; the real-time transport
/// belongs to an external collaborator.
#[derive(Default)]
pub(crate) struct LoggingNotifier;

impl ChangeNotifier for LoggingNotifier {
    fn application_changed(&self, application: &LoanApplication) -> Result<(), NotifyError> {
        info!(
            user_id = %application.user_id.0,
            application_id = %application.id,
            status = %application.status,
            "application changed"
        );
        Ok(())
    }

    fn activity_recorded(&self, activity: &AgentActivity) -> Result<(), NotifyError> {
        info!(
            application_id = %activity.application_id,
            agent = %activity.agent,
            action = %activity.action,
            "activity recorded"
        );
        Ok(())
    }
}

/// Development stand-in for the external auth collaborator: any non-empty
/// bearer token authenticates as itself.
#[derive(Default)]
pub(crate) struct TrustedTokenAuthenticator;

impl CallerAuthenticator for TrustedTokenAuthenticator {
    fn authenticate(&self, bearer_token: &str) -> Result<UserId, AuthError> {
        let token = bearer_token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthorized);
        }
        Ok(UserId(token.to_string()))
    }
}
