//! Loan application pipeline: submission intake, the five-agent stage
//! chain, its audit trail, and the delayed-stage scheduler.
//!
//! Stage handlers are pure decision functions; everything stateful flows
//! through the [`repository::LoanRepository`] and [`scheduler::StageQueue`]
//! contracts so storage and durability stay pluggable.

pub mod auth;
pub mod decision;
pub mod domain;
pub(crate) mod intake;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod stages;

#[cfg(test)]
mod tests;

pub use auth::{AuthError, CallerAuthenticator};
pub use decision::{
    DecisionSource, DocumentChecks, SimulatedDecisions, BASE_INTEREST_RATE, CREDIT_SCORE_FLOOR,
    CREDIT_SCORE_SPAN, DEBT_TO_INCOME_RATIO, INCOME_MULTIPLIER, INTEREST_RATE_SPREAD,
    MINIMUM_CREDIT_SCORE,
};
pub use domain::{
    ActivityId, ActivityStatus, AgentActivity, AgentKind, ApplicantSnapshot, ApplicationId,
    EligibilityResult, LoanApplication, LoanRequest, LoanStatus, LoanStatusView, MetadataValue,
    SubmissionReceipt, UserId,
};
pub use intake::{SubmissionGuard, ValidationError, ALLOWED_TENURES, SUGGESTED_PURPOSES};
pub use repository::{
    CancelOutcome, ChangeNotifier, LoanRepository, NotifyError, RepositoryError, StageCommit,
};
pub use router::loan_router;
pub use scheduler::{QueueError, ScheduledStage, StageQueue};
pub use service::{LoanPipelineService, PipelineError, SUBMISSION_ACK};
pub use stages::{PipelineStage, StageOutcome, SANCTION_LETTER_URL};
