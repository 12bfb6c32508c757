use super::domain::LoanRequest;

/// Tenures the product actually offers, in months.
pub const ALLOWED_TENURES: [u32; 7] = [6, 12, 18, 24, 36, 48, 60];

/// Purposes suggested by the intake form. The purpose field itself stays
/// free text; anything non-empty is accepted.
pub const SUGGESTED_PURPOSES: [&str; 9] = [
    "Home Renovation",
    "Wedding",
    "Education",
    "Medical Emergency",
    "Debt Consolidation",
    "Business Expansion",
    "Travel",
    "Vehicle Purchase",
    "Other",
];

/// Validation errors raised by the submission guard. Nothing persists when
/// one of these fires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("loan amount must be greater than zero")]
    NonPositiveAmount,
    #[error("a tenure of {0} months is not offered")]
    UnsupportedTenure(u32),
    #[error("loan purpose must not be empty")]
    EmptyPurpose,
    #[error("declared monthly income must be greater than zero")]
    MissingIncome,
}

/// Guard responsible for screening inbound submissions before an
/// application record is created.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard;

impl SubmissionGuard {
    /// Validate an inbound request, returning it with the purpose trimmed.
    pub fn screen(&self, mut request: LoanRequest) -> Result<LoanRequest, ValidationError> {
        if request.amount == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }

        if !ALLOWED_TENURES.contains(&request.tenure_months) {
            return Err(ValidationError::UnsupportedTenure(request.tenure_months));
        }

        request.purpose = request.purpose.trim().to_string();
        if request.purpose.is_empty() {
            return Err(ValidationError::EmptyPurpose);
        }

        if request.user_data.monthly_income == 0 {
            return Err(ValidationError::MissingIncome);
        }

        Ok(request)
    }
}
