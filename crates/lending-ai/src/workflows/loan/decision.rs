//! Decision sources for the simulated stages.
//!
//! Every number a stage "decides" (interest rate, document checks, credit
//! score) flows through [`DecisionSource`] so tests can pin values and a
//! real verification/bureau provider can replace the simulation without
//! touching orchestration logic.

use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use super::domain::ApplicantSnapshot;

/// Base annual interest rate quoted by the sales stage, in percent.
pub const BASE_INTEREST_RATE: f64 = 10.5;
/// Width of the random offset added to the base rate, in percent.
pub const INTEREST_RATE_SPREAD: f64 = 2.0;
/// Lowest credit score the simulated bureau reports.
pub const CREDIT_SCORE_FLOOR: u16 = 650;
/// Width of the simulated credit score range; scores land in
/// `[CREDIT_SCORE_FLOOR, CREDIT_SCORE_FLOOR + CREDIT_SCORE_SPAN)`.
pub const CREDIT_SCORE_SPAN: u16 = 200;
/// Minimum score underwriting accepts.
pub const MINIMUM_CREDIT_SCORE: u16 = 650;
/// Maximum eligible amount is this many times the monthly income.
pub const INCOME_MULTIPLIER: u64 = 60;
/// Illustrative debt-to-income figure recorded on the underwriting
/// activity.
pub const DEBT_TO_INCOME_RATIO: f64 = 0.35;

/// Per-document verification verdicts produced by the verification stage's
/// provider. The shape must stay stable when the simulation is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChecks {
    pub pan_verified: bool,
    pub aadhaar_verified: bool,
    pub bureau_check_passed: bool,
}

/// Source of the values the pipeline pretends to compute.
pub trait DecisionSource: Send + Sync {
    /// Annual interest rate in percent, expected within
    /// `[BASE_INTEREST_RATE, BASE_INTEREST_RATE + INTEREST_RATE_SPREAD)`.
    fn interest_rate(&self) -> f64;

    /// Verification verdicts for the applicant's identity documents.
    fn document_checks(&self, applicant: &ApplicantSnapshot) -> DocumentChecks;

    /// Credit score as reported by the (simulated) bureau.
    fn credit_score(&self) -> u16;
}

/// Default simulation: bounded random draws from a deterministic PCG
/// stream, so a seeded instance replays the same pipeline.
pub struct SimulatedDecisions {
    rng: Mutex<Pcg64Mcg>,
}

impl SimulatedDecisions {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(Pcg64Mcg::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self::seeded(rand::random())
    }

    fn with_rng<T>(&self, draw: impl FnOnce(&mut Pcg64Mcg) -> T) -> T {
        let mut rng = self.rng.lock().expect("decision rng mutex poisoned");
        draw(&mut rng)
    }
}

impl DecisionSource for SimulatedDecisions {
    fn interest_rate(&self) -> f64 {
        BASE_INTEREST_RATE + self.with_rng(|rng| rng.gen::<f64>()) * INTEREST_RATE_SPREAD
    }

    fn document_checks(&self, _applicant: &ApplicantSnapshot) -> DocumentChecks {
        // The simulation always clears the documents, as the system it
        // stands in for did.
        DocumentChecks {
            pan_verified: true,
            aadhaar_verified: true,
            bureau_check_passed: true,
        }
    }

    fn credit_score(&self) -> u16 {
        CREDIT_SCORE_FLOOR + self.with_rng(|rng| rng.gen_range(0..CREDIT_SCORE_SPAN))
    }
}
