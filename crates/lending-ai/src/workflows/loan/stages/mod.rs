//! Stage handlers: pure decision logic over an application plus a decision
//! source, returning the status transition and audit payload for the
//! orchestrator to commit.

mod sales;
mod sanction;
mod underwriting;
mod verification;

pub use sanction::SANCTION_LETTER_URL;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::decision::DecisionSource;
use super::domain::{
    AgentKind, EligibilityResult, LoanApplication, LoanStatus, MetadataValue,
};
use crate::config::PipelineConfig;

/// The four scheduled stages, in pipeline order. The master record is
/// written synchronously at submission and is not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Sales,
    Verification,
    Underwriting,
    Sanction,
}

impl PipelineStage {
    pub const fn first() -> Self {
        PipelineStage::Sales
    }

    pub const fn agent(self) -> AgentKind {
        match self {
            PipelineStage::Sales => AgentKind::Sales,
            PipelineStage::Verification => AgentKind::Verification,
            PipelineStage::Underwriting => AgentKind::Underwriting,
            PipelineStage::Sanction => AgentKind::Sanction,
        }
    }

    /// The only status a stage may run from; the transition table's "From"
    /// column.
    pub const fn expected_status(self) -> LoanStatus {
        match self {
            PipelineStage::Sales => LoanStatus::Initiated,
            PipelineStage::Verification => LoanStatus::KycPending,
            PipelineStage::Underwriting => LoanStatus::VerificationComplete,
            PipelineStage::Sanction => LoanStatus::Underwriting,
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            PipelineStage::Sales => Some(PipelineStage::Verification),
            PipelineStage::Verification => Some(PipelineStage::Underwriting),
            PipelineStage::Underwriting => Some(PipelineStage::Sanction),
            PipelineStage::Sanction => None,
        }
    }

    /// How long the scheduler waits before dispatching this stage.
    pub fn delay(self, config: &PipelineConfig) -> std::time::Duration {
        match self {
            PipelineStage::Sales => config.intake_delay(),
            _ => config.stage_delay(),
        }
    }

    pub const fn label(self) -> &'static str {
        self.agent().label()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a stage handler decided: the transition target, the audit payload,
/// and (for underwriting) the fields patched onto the application.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub to_status: LoanStatus,
    pub action: String,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub credit_score: Option<u16>,
    pub eligibility: Option<EligibilityResult>,
}

impl StageOutcome {
    fn transition(to_status: LoanStatus, action: &str) -> Self {
        Self {
            to_status,
            action: action.to_string(),
            metadata: BTreeMap::new(),
            credit_score: None,
            eligibility: None,
        }
    }
}

/// Run one stage's decision logic. Pure apart from the decision source:
/// no storage access, no clocks, no suspension.
pub fn evaluate(
    stage: PipelineStage,
    application: &LoanApplication,
    decisions: &dyn DecisionSource,
) -> StageOutcome {
    match stage {
        PipelineStage::Sales => sales::run(application, decisions),
        PipelineStage::Verification => verification::run(application, decisions),
        PipelineStage::Underwriting => underwriting::run(application, decisions),
        PipelineStage::Sanction => sanction::run(application),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_transition_table() {
        let mut stage = Some(PipelineStage::first());
        let mut walked = Vec::new();
        while let Some(current) = stage {
            walked.push((current.expected_status(), current.agent()));
            stage = current.next();
        }

        assert_eq!(
            walked,
            vec![
                (LoanStatus::Initiated, AgentKind::Sales),
                (LoanStatus::KycPending, AgentKind::Verification),
                (LoanStatus::VerificationComplete, AgentKind::Underwriting),
                (LoanStatus::Underwriting, AgentKind::Sanction),
            ]
        );
    }

    #[test]
    fn sales_uses_the_intake_delay() {
        let config = PipelineConfig {
            intake_delay_ms: 2_000,
            stage_delay_ms: 3_000,
            retry_delay_ms: 3_000,
            stalled_after_ms: 15_000,
        };
        assert_eq!(PipelineStage::Sales.delay(&config).as_millis(), 2_000);
        assert_eq!(PipelineStage::Sanction.delay(&config).as_millis(), 3_000);
    }
}
