use super::StageOutcome;
use crate::workflows::loan::decision::DecisionSource;
use crate::workflows::loan::domain::{LoanApplication, LoanStatus, MetadataValue};

/// Identity/document verification. The provider contract (identifiers in,
/// verified booleans out) is the extension point for a real KYC vendor;
/// only the metadata rendering lives here.
pub(super) fn run(application: &LoanApplication, decisions: &dyn DecisionSource) -> StageOutcome {
    let checks = decisions.document_checks(&application.applicant);

    let mut outcome =
        StageOutcome::transition(LoanStatus::VerificationComplete, "KYC verification complete");
    outcome
        .metadata
        .insert("pan_verified".to_string(), checks.pan_verified.into());
    outcome.metadata.insert(
        "aadhaar_verified".to_string(),
        checks.aadhaar_verified.into(),
    );
    outcome.metadata.insert(
        "cibil_check".to_string(),
        MetadataValue::Text(
            if checks.bureau_check_passed {
                "passed"
            } else {
                "failed"
            }
            .to_string(),
        ),
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::loan::decision::DocumentChecks;
    use crate::workflows::loan::domain::{
        ApplicantSnapshot, ApplicationId, LoanApplication, UserId,
    };
    use chrono::Utc;

    struct FixedChecks(DocumentChecks);

    impl DecisionSource for FixedChecks {
        fn interest_rate(&self) -> f64 {
            unreachable!("verification never quotes rates")
        }

        fn document_checks(&self, _applicant: &ApplicantSnapshot) -> DocumentChecks {
            self.0
        }

        fn credit_score(&self) -> u16 {
            unreachable!("verification never scores credit")
        }
    }

    fn application() -> LoanApplication {
        let now = Utc::now();
        LoanApplication {
            id: ApplicationId("loan-000002".to_string()),
            user_id: UserId("user-1".to_string()),
            amount: 250_000,
            purpose: "Travel".to_string(),
            tenure_months: 12,
            status: LoanStatus::KycPending,
            applicant: ApplicantSnapshot {
                monthly_income: 45_000,
                employment_type: "Self-Employed".to_string(),
                pan_number: Some("ABCDE1234F".to_string()),
                aadhaar_number: Some("1234-5678-9012".to_string()),
            },
            credit_score: None,
            eligibility_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn records_document_flags_and_bureau_outcome() {
        let decisions = FixedChecks(DocumentChecks {
            pan_verified: true,
            aadhaar_verified: true,
            bureau_check_passed: true,
        });
        let outcome = run(&application(), &decisions);

        assert_eq!(outcome.to_status, LoanStatus::VerificationComplete);
        assert_eq!(outcome.action, "KYC verification complete");
        assert_eq!(
            outcome.metadata.get("pan_verified"),
            Some(&MetadataValue::Boolean(true))
        );
        assert_eq!(
            outcome.metadata.get("aadhaar_verified"),
            Some(&MetadataValue::Boolean(true))
        );
        assert_eq!(
            outcome.metadata.get("cibil_check"),
            Some(&MetadataValue::Text("passed".to_string()))
        );
    }

    #[test]
    fn failed_bureau_check_is_spelled_out() {
        let decisions = FixedChecks(DocumentChecks {
            pan_verified: false,
            aadhaar_verified: true,
            bureau_check_passed: false,
        });
        let outcome = run(&application(), &decisions);

        assert_eq!(
            outcome.metadata.get("pan_verified"),
            Some(&MetadataValue::Boolean(false))
        );
        assert_eq!(
            outcome.metadata.get("cibil_check"),
            Some(&MetadataValue::Text("failed".to_string()))
        );
    }
}
