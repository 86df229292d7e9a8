use crate::infra::{
    default_plan_catalog, standard_commission_rules, InMemoryBillingRepository,
    InMemoryCommissionRepository, InMemoryWorkflowRepository,
};
use clap::Args;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use lendflow::billing::{UsageMeteringService, UsageType};
use lendflow::commissions::CommissionEngine;
use lendflow::error::AppError;
use lendflow::workflows::application::{
    ActorRef, ActorRole, ApplicationStatus, ApplicationWorkflowService, NewApplication,
    ReviewDecision, StepPayload, WorkflowStep,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the application review portion of the demo.
    #[arg(long)]
    pub(crate) skip_workflow: bool,
    /// Skip the usage metering portion of the demo.
    #[arg(long)]
    pub(crate) skip_usage: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    if !args.skip_workflow {
        run_workflow_demo()?;
    }
    if !args.skip_usage {
        if !args.skip_workflow {
            println!();
        }
        run_usage_demo()?;
    }
    Ok(())
}

fn run_workflow_demo() -> Result<(), AppError> {
    println!("Application review demo");

    let repository = Arc::new(InMemoryWorkflowRepository::default());
    let commissions = Arc::new(InMemoryCommissionRepository::with_rules(
        standard_commission_rules(),
    ));
    let engine = Arc::new(CommissionEngine::new(commissions));
    let service = ApplicationWorkflowService::new(repository, engine.clone());

    let broker_id = Uuid::new_v4();
    let application = service.create(NewApplication {
        applicant_id: Uuid::new_v4(),
        broker_id: Some(broker_id),
        loan_purpose: "equipment purchase".to_string(),
        loan_amount: Decimal::from(180_000),
        loan_term_months: Some(48),
        interest_rate: None,
    })?;
    println!(
        "Created application {} for {} ({})",
        application.application_number.0, application.loan_purpose, application.loan_amount
    );

    service.submit(&application.id, None)?;

    let reviewer = ActorRef {
        id: Uuid::new_v4(),
        role: ActorRole::OrganizationStaff,
    };

    service.complete_step(
        &application.id,
        1,
        &reviewer,
        Some("File checked for completeness".to_string()),
        None,
    )?;

    let mut verified = BTreeMap::new();
    verified.insert("identity".to_string(), true);
    verified.insert("bank_statements".to_string(), true);
    verified.insert("tax_returns".to_string(), true);
    service.complete_step(
        &application.id,
        2,
        &reviewer,
        None,
        Some(StepPayload::DocumentVerification(verified)),
    )?;

    let mut credit = BTreeMap::new();
    credit.insert("bureau".to_string(), json!("equifax"));
    credit.insert("score".to_string(), json!(712));
    service.complete_step(
        &application.id,
        3,
        &reviewer,
        None,
        Some(StepPayload::CreditCheck(credit)),
    )?;

    service.complete_step(
        &application.id,
        4,
        &reviewer,
        Some("Approved within standard policy".to_string()),
        Some(StepPayload::Decision(ReviewDecision::Approved)),
    )?;
    service.update_status(
        &application.id,
        ApplicationStatus::Funded,
        Some("Funds disbursed".to_string()),
        Some(&reviewer),
    )?;

    println!("\nReview steps");
    let progress = service.get_progress(&application.id)?;
    for step in WorkflowStep::ALL {
        let slot = progress.step(step);
        let marker = if slot.completed { "x" } else { " " };
        println!("- [{marker}] {}: {}", step.index(), step.label());
    }
    println!(
        "Current step: {} ({})",
        progress.current_step().index(),
        progress.current_step().label()
    );

    println!("\nStatus history");
    for change in service.status_history(&application.id)? {
        let notes = change.notes.unwrap_or_default();
        println!("- {}: {}", change.status.label(), notes);
    }

    let earnings = engine
        .earnings_summary(&broker_id)
        .map_err(AppError::from)?;
    println!("\nBroker commissions");
    println!(
        "- {} accrued, pending {}, approved {}, paid {}",
        earnings.total_commissions,
        earnings.pending_amount,
        earnings.approved_amount,
        earnings.paid_amount
    );

    Ok(())
}

fn run_usage_demo() -> Result<(), AppError> {
    println!("Usage metering demo");

    let repository = Arc::new(InMemoryBillingRepository::with_plans(default_plan_catalog()));
    let starter = repository
        .plans()
        .into_iter()
        .find(|plan| plan.name == "Starter")
        .expect("catalog contains the starter plan");
    let subscription = repository.create_subscription(Uuid::new_v4(), starter, chrono::Utc::now());
    let service = UsageMeteringService::new(repository);

    println!(
        "Provisioned {} subscription with {} LLM tokens per period",
        subscription.plan.name, subscription.plan.llm_tokens_limit
    );

    for tokens in [70_000, 15_000, 20_000] {
        service.record_usage(&subscription.id, UsageType::Llm, tokens, None, None)?;
        let view = service.usage_summary(&subscription.id)?;
        println!(
            "- recorded {tokens} tokens: {}/{} used ({}%)",
            view.llm.used, view.llm.limit, view.llm.percentage
        );
    }

    let report = service.check_usage_limits(&subscription.id)?;
    println!("\nLimit check");
    if report.warnings.is_empty() {
        println!("- no warnings");
    }
    for warning in &report.warnings {
        println!("- [{:?}] {}", warning.severity, warning.message);
    }
    match report.suggested_upgrade {
        Some(upgrade) => println!(
            "Suggested upgrade: {} at {} ({} LLM tokens)",
            upgrade.plan_name, upgrade.price, upgrade.llm_tokens_limit
        ),
        None => println!("No higher plan available"),
    }

    Ok(())
}
