use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use lending_ai::config::PipelineConfig;
use lending_ai::error::AppError;
use lending_ai::workflows::loan::{
    ApplicantSnapshot, LoanPipelineService, LoanRequest, MetadataValue, SimulatedDecisions,
};

use crate::infra::{
    InMemoryLoanRepository, InMemoryStageQueue, LoggingNotifier, TrustedTokenAuthenticator,
};

const DEMO_TOKEN: &str = "demo-applicant";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Requested loan amount in currency minor units
    #[arg(long, default_value_t = 2_000_000)]
    pub(crate) amount: u64,
    /// Loan purpose
    #[arg(long, default_value = "Home Renovation")]
    pub(crate) purpose: String,
    /// Tenure in months (one of 6, 12, 18, 24, 36, 48, 60)
    #[arg(long, default_value_t = 12)]
    pub(crate) tenure_months: u32,
    /// Applicant's declared monthly income
    #[arg(long, default_value_t = 50_000)]
    pub(crate) monthly_income: u64,
    /// Applicant's employment type
    #[arg(long, default_value = "Salaried")]
    pub(crate) employment_type: String,
    /// Seed for the simulated decision source, for reproducible runs
    #[arg(long)]
    pub(crate) seed: Option<u64>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    // Short delays keep the demo snappy while still showing the stages
    // landing one at a time.
    let config = PipelineConfig {
        intake_delay_ms: 400,
        stage_delay_ms: 600,
        retry_delay_ms: 600,
        stalled_after_ms: 30_000,
    };

    let decisions = match args.seed {
        Some(seed) => SimulatedDecisions::seeded(seed),
        None => SimulatedDecisions::from_entropy(),
    };

    let service = Arc::new(LoanPipelineService::new(
        Arc::new(InMemoryLoanRepository::default()),
        Arc::new(InMemoryStageQueue::default()),
        Arc::new(LoggingNotifier),
        Arc::new(TrustedTokenAuthenticator),
        Arc::new(decisions),
        config,
    ));

    println!("Agentic loan pipeline demo");

    let request = LoanRequest {
        amount: args.amount,
        purpose: args.purpose,
        tenure_months: args.tenure_months,
        user_data: ApplicantSnapshot {
            monthly_income: args.monthly_income,
            employment_type: args.employment_type,
            pan_number: Some("ABCDE1234F".to_string()),
            aadhaar_number: Some("1234-5678-9012".to_string()),
        },
    };

    let receipt = match service.submit(DEMO_TOKEN, request) {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Submission rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Submitted {} for {} over {} months",
        receipt.application_id.0, args.amount, args.tenure_months
    );
    println!("  Acknowledgement: {}", receipt.message);

    let id = receipt.application_id.clone();
    let mut final_view = None;
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match service.application(DEMO_TOKEN, &id) {
            Ok(application) if application.status.is_terminal() => {
                final_view = Some(application);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                println!("  Status lookup unavailable: {}", err);
                return Ok(());
            }
        }
    }

    let application = match final_view {
        Some(application) => application,
        None => {
            println!("  Pipeline did not finish in time; try the stalled query");
            return Ok(());
        }
    };

    println!("\nAgent timeline");
    let activities = service.activities(DEMO_TOKEN, &id)?;
    for activity in &activities {
        println!("- {} | {}", activity.agent, activity.action);
        for (key, value) in &activity.metadata {
            println!("    {key}: {}", render_metadata(value));
        }
    }

    println!("\nFinal status: {}", application.status);
    if let Some(score) = application.credit_score {
        println!("Credit score: {score}");
    }
    if let Some(eligibility) = &application.eligibility_result {
        println!(
            "Eligible: {} | Max amount: {} | Recommended tenure: {} months",
            eligibility.eligible, eligibility.max_amount, eligibility.recommended_tenure
        );
    }

    Ok(())
}

fn render_metadata(value: &MetadataValue) -> String {
    match value {
        MetadataValue::Boolean(value) => value.to_string(),
        MetadataValue::Integer(value) => value.to_string(),
        MetadataValue::Decimal(value) => format!("{value:.2}"),
        MetadataValue::Text(value) => value.clone(),
    }
}
