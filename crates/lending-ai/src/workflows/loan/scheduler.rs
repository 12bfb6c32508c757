use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ApplicationId;
use super::stages::PipelineStage;

/// Persisted "next stage pointer": one delayed task per (application,
/// stage). The record outlives the process so a restart can resume the
/// chain instead of losing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledStage {
    pub application_id: ApplicationId,
    pub stage: PipelineStage,
    pub run_at: DateTime<Utc>,
    pub attempt: u32,
}

impl ScheduledStage {
    /// The retry copy of a task whose commit failed.
    pub fn retried(&self, run_at: DateTime<Utc>) -> Self {
        Self {
            application_id: self.application_id.clone(),
            stage: self.stage,
            run_at,
            attempt: self.attempt + 1,
        }
    }
}

/// Durable delayed-task queue contract. Implementations must key tasks by
/// (application id, stage) and guarantee:
///
/// - `enqueue` rejects a key that was ever enqueued before, so a stage is
///   scheduled at most once per application (retries go through `release`);
/// - `claim` hands a pending task to exactly one caller; a second claim
///   for the same key returns `None` until the task is released;
/// - `recover` returns every task not yet completed or cancelled, claimed
///   or not, so a restart can re-drive what a crashed process owed.
pub trait StageQueue: Send + Sync {
    fn enqueue(&self, task: ScheduledStage) -> Result<(), QueueError>;

    fn claim(
        &self,
        id: &ApplicationId,
        stage: PipelineStage,
    ) -> Result<Option<ScheduledStage>, QueueError>;

    /// Mark a claimed task as done; it will never be handed out again.
    fn complete(&self, id: &ApplicationId, stage: PipelineStage) -> Result<(), QueueError>;

    /// Put a claimed task back as pending with updated run time/attempt,
    /// making it eligible for retry.
    fn release(&self, task: ScheduledStage) -> Result<(), QueueError>;

    /// Drop every not-yet-claimed task for an application; claims in
    /// flight finish on their own and lose to the conditional commit.
    fn cancel_all(&self, id: &ApplicationId) -> Result<(), QueueError>;

    /// The recovery pass: return every task still owed an execution,
    /// reverting stale claims (a dead worker's) back to pending first.
    fn recover(&self) -> Result<Vec<ScheduledStage>, QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("stage already scheduled for this application")]
    Duplicate,
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
