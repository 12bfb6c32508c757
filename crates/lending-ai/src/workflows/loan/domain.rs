use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for the applicant, minted by the external auth
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for audit activities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

/// Income and employment snapshot captured at submission and carried on the
/// application record so downstream stages (and a recovered scheduler) can
/// re-read it without the original request in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantSnapshot {
    pub monthly_income: u64,
    pub employment_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
}

/// Submission payload accepted from the loan application form collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub amount: u64,
    pub purpose: String,
    pub tenure_months: u32,
    pub user_data: ApplicantSnapshot,
}

/// Status ladder for a loan application. Transitions are monotonic along
/// the pipeline order; `Sanctioned`, `Rejected`, and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Initiated,
    KycPending,
    VerificationComplete,
    Underwriting,
    Sanctioned,
    Rejected,
    Cancelled,
}

impl LoanStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LoanStatus::Initiated => "initiated",
            LoanStatus::KycPending => "kyc_pending",
            LoanStatus::VerificationComplete => "verification_complete",
            LoanStatus::Underwriting => "underwriting",
            LoanStatus::Sanctioned => "sanctioned",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            LoanStatus::Sanctioned | LoanStatus::Rejected | LoanStatus::Cancelled
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The agent (pipeline stage persona) that produced an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Master,
    Sales,
    Verification,
    Underwriting,
    Sanction,
}

impl AgentKind {
    pub const fn label(self) -> &'static str {
        match self {
            AgentKind::Master => "master",
            AgentKind::Sales => "sales",
            AgentKind::Verification => "verification",
            AgentKind::Underwriting => "underwriting",
            AgentKind::Sanction => "sanction",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome recorded on an audit activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Success,
    Failed,
}

/// Scalar value stored in activity metadata so findings stay structured
/// without a free-form JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for MetadataValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Underwriting output persisted on the application; set once, never
/// cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub eligible: bool,
    pub max_amount: u64,
    pub recommended_tenure: u32,
}

/// A loan application as persisted by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub amount: u64,
    pub purpose: String,
    pub tenure_months: u32,
    pub status: LoanStatus,
    pub applicant: ApplicantSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_score: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility_result: Option<EligibilityResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanApplication {
    /// Sanitized projection for API responses; withholds the applicant
    /// snapshot and owning user id.
    pub fn status_view(&self) -> LoanStatusView {
        LoanStatusView {
            application_id: self.id.clone(),
            status: self.status.label(),
            amount: self.amount,
            purpose: self.purpose.clone(),
            tenure_months: self.tenure_months,
            credit_score: self.credit_score,
            eligibility_result: self.eligibility_result.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public representation of an application's progress.
#[derive(Debug, Clone, Serialize)]
pub struct LoanStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub amount: u64,
    pub purpose: String,
    pub tenure_months: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility_result: Option<EligibilityResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit record: one per stage execution per application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub id: ActivityId,
    pub application_id: ApplicationId,
    pub agent: AgentKind,
    pub action: String,
    pub status: ActivityStatus,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement returned to the submitting caller; downstream stages run
/// asynchronously after it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub application_id: ApplicationId,
    pub message: String,
}
