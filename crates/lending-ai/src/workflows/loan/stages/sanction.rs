use super::StageOutcome;
use crate::workflows::loan::domain::{LoanApplication, LoanStatus, MetadataValue};

/// Path to the generated sanction artifact recorded on approval.
pub const SANCTION_LETTER_URL: &str = "/documents/sanction_letter.pdf";

/// Terminal decision: reads the eligibility result underwriting persisted
/// and selects the terminal branch. An application reaching this stage
/// always carries an eligibility result; a missing one rejects.
pub(super) fn run(application: &LoanApplication) -> StageOutcome {
    let eligible = application
        .eligibility_result
        .as_ref()
        .map(|result| result.eligible)
        .unwrap_or(false);

    let (to_status, action) = if eligible {
        (LoanStatus::Sanctioned, "Sanction letter generated")
    } else {
        (LoanStatus::Rejected, "Application rejected")
    };

    let mut outcome = StageOutcome::transition(to_status, action);
    outcome.metadata.insert(
        "sanction_status".to_string(),
        MetadataValue::Text(to_status.label().to_string()),
    );
    if eligible {
        outcome.metadata.insert(
            "sanction_letter_url".to_string(),
            MetadataValue::Text(SANCTION_LETTER_URL.to_string()),
        );
    }
    outcome
}
