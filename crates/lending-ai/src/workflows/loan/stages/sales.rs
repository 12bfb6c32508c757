use super::StageOutcome;
use crate::workflows::loan::decision::DecisionSource;
use crate::workflows::loan::domain::{LoanApplication, LoanStatus, MetadataValue};

/// Negotiate terms: quote a rate in the configured band and echo the
/// requested amount/tenure as the suggested deal.
pub(super) fn run(application: &LoanApplication, decisions: &dyn DecisionSource) -> StageOutcome {
    let mut outcome = StageOutcome::transition(LoanStatus::KycPending, "Negotiating loan terms");
    outcome
        .metadata
        .insert("suggested_amount".to_string(), application.amount.into());
    outcome.metadata.insert(
        "suggested_tenure".to_string(),
        application.tenure_months.into(),
    );
    outcome.metadata.insert(
        "interest_rate".to_string(),
        MetadataValue::Decimal(decisions.interest_rate()),
    );
    outcome
}
