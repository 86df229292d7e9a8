use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commissions::TriggerEvent;

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable reference printed on correspondence and lender payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationNumber(pub String);

impl ApplicationNumber {
    /// `APP` followed by eight uppercase hex characters.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("APP{}", hex[..8].to_uppercase()))
    }
}

/// Roles recognized by the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    SystemAdmin,
    OrganizationManager,
    OrganizationStaff,
    Broker,
    Applicant,
}

impl ActorRole {
    /// Only back-office roles may drive the review workflow; applicants
    /// and referring brokers are read-only parties.
    pub const fn is_workflow_operator(self) -> bool {
        matches!(
            self,
            ActorRole::SystemAdmin | ActorRole::OrganizationManager | ActorRole::OrganizationStaff
        )
    }
}

/// The acting party recorded on step completions and status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: Uuid,
    pub role: ActorRole,
}

/// Overall lifecycle state of a loan application.
///
/// `DocumentsVerified` and `CreditCheck` are intermediate review states
/// written by the administrative step override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Submitted,
    UnderReview,
    DocumentsVerified,
    CreditCheck,
    Approved,
    Rejected,
    Funded,
    Cancelled,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::DocumentsVerified => "documents_verified",
            ApplicationStatus::CreditCheck => "credit_check",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Funded => "funded",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }
}

/// A loan request moving through the review workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub applicant_id: Uuid,
    pub broker_id: Option<Uuid>,
    pub loan_purpose: String,
    pub loan_amount: Decimal,
    pub loan_term_months: Option<u32>,
    pub interest_rate: Option<Decimal>,
    pub status: ApplicationStatus,
    pub submission_date: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub funding_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input accepted when opening a new application.
#[derive(Debug, Clone, Deserialize)]
pub struct NewApplication {
    pub applicant_id: Uuid,
    #[serde(default)]
    pub broker_id: Option<Uuid>,
    pub loan_purpose: String,
    pub loan_amount: Decimal,
    #[serde(default)]
    pub loan_term_months: Option<u32>,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

/// Immutable audit row appended on every status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Uuid,
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub notes: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The six ordered review stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkflowStep {
    Submitted,
    InitialReview,
    DocumentVerification,
    CreditCheck,
    FinalApproval,
    Funding,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 6] = [
        WorkflowStep::Submitted,
        WorkflowStep::InitialReview,
        WorkflowStep::DocumentVerification,
        WorkflowStep::CreditCheck,
        WorkflowStep::FinalApproval,
        WorkflowStep::Funding,
    ];

    pub const fn index(self) -> u8 {
        match self {
            WorkflowStep::Submitted => 0,
            WorkflowStep::InitialReview => 1,
            WorkflowStep::DocumentVerification => 2,
            WorkflowStep::CreditCheck => 3,
            WorkflowStep::FinalApproval => 4,
            WorkflowStep::Funding => 5,
        }
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(WorkflowStep::Submitted),
            1 => Some(WorkflowStep::InitialReview),
            2 => Some(WorkflowStep::DocumentVerification),
            3 => Some(WorkflowStep::CreditCheck),
            4 => Some(WorkflowStep::FinalApproval),
            5 => Some(WorkflowStep::Funding),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WorkflowStep::Submitted => "Application Submitted",
            WorkflowStep::InitialReview => "Initial Review",
            WorkflowStep::DocumentVerification => "Document Verification",
            WorkflowStep::CreditCheck => "Credit Check",
            WorkflowStep::FinalApproval => "Final Approval",
            WorkflowStep::Funding => "Funding",
        }
    }

    pub const fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

/// Outcome recorded by the final-approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub const fn status(self) -> ApplicationStatus {
        match self {
            ReviewDecision::Approved => ApplicationStatus::Approved,
            ReviewDecision::Rejected => ApplicationStatus::Rejected,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
        }
    }
}

/// Step-specific evidence; the variant must match the step being completed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    /// Step 2: which document types passed verification.
    DocumentVerification(BTreeMap<String, bool>),
    /// Step 3: raw credit-bureau response fields.
    CreditCheck(BTreeMap<String, serde_json::Value>),
    /// Step 4: the approval decision.
    Decision(ReviewDecision),
}

impl StepPayload {
    /// The step a payload variant belongs to.
    pub const fn step(&self) -> WorkflowStep {
        match self {
            StepPayload::DocumentVerification(_) => WorkflowStep::DocumentVerification,
            StepPayload::CreditCheck(_) => WorkflowStep::CreditCheck,
            StepPayload::Decision(_) => WorkflowStep::FinalApproval,
        }
    }
}

/// Completion evidence for a single step slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRecord {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub payload: Option<StepPayload>,
}

/// Workflow occurrence published to downstream accrual (commissions).
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationEvent {
    pub application_id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub broker_id: Option<Uuid>,
    pub loan_amount: Decimal,
    pub trigger: TriggerEvent,
}
