use super::StageOutcome;
use crate::workflows::loan::decision::{
    DecisionSource, DEBT_TO_INCOME_RATIO, INCOME_MULTIPLIER, MINIMUM_CREDIT_SCORE,
};
use crate::workflows::loan::domain::{
    EligibilityResult, LoanApplication, LoanStatus, MetadataValue,
};

/// Credit evaluation: the only stage whose output gates the terminal
/// branch. Eligibility is the conjunction of the income-derived ceiling
/// and the score threshold.
pub(super) fn run(application: &LoanApplication, decisions: &dyn DecisionSource) -> StageOutcome {
    let credit_score = decisions.credit_score();
    let max_eligible_amount = application
        .applicant
        .monthly_income
        .saturating_mul(INCOME_MULTIPLIER);
    let eligible =
        application.amount <= max_eligible_amount && credit_score >= MINIMUM_CREDIT_SCORE;

    let mut outcome = StageOutcome::transition(LoanStatus::Underwriting, "Credit evaluation complete");
    outcome
        .metadata
        .insert("credit_score".to_string(), credit_score.into());
    outcome.metadata.insert(
        "max_eligible_amount".to_string(),
        max_eligible_amount.into(),
    );
    outcome.metadata.insert(
        "debt_to_income_ratio".to_string(),
        MetadataValue::Decimal(DEBT_TO_INCOME_RATIO),
    );
    outcome.credit_score = Some(credit_score);
    outcome.eligibility = Some(EligibilityResult {
        eligible,
        max_amount: max_eligible_amount,
        recommended_tenure: application.tenure_months,
    });
    outcome
}
