use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::domain::{
    ApplicationEvent, ApplicationId, ApplicationNumber, LoanApplication, ReviewDecision,
    StatusChange, StepPayload, WorkflowStep,
};
use super::progress::ApplicationProgress;

/// Storage abstraction for applications, their progress record, and the
/// append-only status history.
///
/// Implementations must apply each call atomically: a step completion or
/// status change either lands fully or not at all.
pub trait ApplicationRepository: Send + Sync {
    fn insert_application(
        &self,
        application: LoanApplication,
    ) -> Result<LoanApplication, RepositoryError>;
    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<LoanApplication>, RepositoryError>;
    fn update_application(&self, application: LoanApplication) -> Result<(), RepositoryError>;
    fn fetch_progress(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationProgress>, RepositoryError>;
    fn upsert_progress(&self, progress: ApplicationProgress) -> Result<(), RepositoryError>;
    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError>;
    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook for workflow occurrences (commission accrual listens here).
pub trait ApplicationEventSink: Send + Sync {
    fn publish(&self, event: ApplicationEvent) -> Result<(), EventError>;
}

/// Event dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Sanitized representation of an application for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub applicant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_id: Option<Uuid>,
    pub loan_purpose: String,
    pub loan_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_term_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Decimal>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&LoanApplication> for ApplicationView {
    fn from(application: &LoanApplication) -> Self {
        Self {
            id: application.id,
            application_number: application.application_number.clone(),
            applicant_id: application.applicant_id,
            broker_id: application.broker_id,
            loan_purpose: application.loan_purpose.clone(),
            loan_amount: application.loan_amount,
            loan_term_months: application.loan_term_months,
            interest_rate: application.interest_rate,
            status: application.status.label(),
            submission_date: application.submission_date,
            decision_date: application.decision_date,
            funding_date: application.funding_date,
            created_at: application.created_at,
        }
    }
}

/// One review step as exposed to API consumers; the step-specific
/// payload is flattened into optional fields.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub step: u8,
    pub label: &'static str,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_verified: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_check_result: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<ReviewDecision>,
}

/// Full progress snapshot returned by the progress endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub application_id: ApplicationId,
    pub current_step: u8,
    pub current_step_label: &'static str,
    pub steps: Vec<StepView>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ApplicationProgress> for ProgressView {
    fn from(progress: &ApplicationProgress) -> Self {
        let steps = WorkflowStep::ALL
            .iter()
            .map(|&step| {
                let slot = progress.step(step);
                let mut view = StepView {
                    step: step.index(),
                    label: step.label(),
                    completed: slot.completed,
                    completed_at: slot.completed_at,
                    completed_by: slot.completed_by,
                    notes: slot.notes.clone(),
                    documents_verified: None,
                    credit_check_result: None,
                    decision: None,
                };
                match &slot.payload {
                    Some(StepPayload::DocumentVerification(map)) => {
                        view.documents_verified = Some(map.clone());
                    }
                    Some(StepPayload::CreditCheck(map)) => {
                        view.credit_check_result = Some(map.clone());
                    }
                    Some(StepPayload::Decision(decision)) => {
                        view.decision = Some(*decision);
                    }
                    None => {}
                }
                view
            })
            .collect();

        Self {
            application_id: progress.application_id(),
            current_step: progress.current_step().index(),
            current_step_label: progress.current_step().label(),
            steps,
            updated_at: progress.updated_at(),
        }
    }
}

/// Status-history row as exposed to API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChangeView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&StatusChange> for StatusChangeView {
    fn from(change: &StatusChange) -> Self {
        Self {
            status: change.status.label(),
            notes: change.notes.clone(),
            changed_by: change.changed_by,
            created_at: change.created_at,
        }
    }
}
