use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflows::application::domain::ApplicationId;

/// Application events that can accrue a broker commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    ApplicationSubmitted,
    ApplicationApproved,
    LoanFunded,
    LoanRepaid,
}

impl TriggerEvent {
    pub const fn label(self) -> &'static str {
        match self {
            TriggerEvent::ApplicationSubmitted => "application_submitted",
            TriggerEvent::ApplicationApproved => "application_approved",
            TriggerEvent::LoanFunded => "loan_funded",
            TriggerEvent::LoanRepaid => "loan_repaid",
        }
    }
}

/// Lifecycle of an accrued commission. Only the transitions
/// pending→approved→paid and {pending,approved}→cancelled are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
    Disputed,
}

impl CommissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
            CommissionStatus::Disputed => "disputed",
        }
    }
}

/// Rate rule keyed by trigger event, with optional payout clamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger: TriggerEvent,
    /// Percentage of the loan amount, e.g. `1.50` for 1.5%.
    pub rate: Decimal,
    pub minimum_amount: Option<Decimal>,
    pub maximum_amount: Option<Decimal>,
    pub is_active: bool,
}

/// A payable amount owed to a referring broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub broker_id: Uuid,
    pub application_id: ApplicationId,
    pub trigger: TriggerEvent,
    pub amount: Decimal,
    pub rate: Decimal,
    pub status: CommissionStatus,
    pub metadata: BTreeMap<String, String>,
    pub calculated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
}

/// Broker earnings rolled up by commission status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsSummary {
    pub total_commissions: usize,
    pub pending_amount: Decimal,
    pub approved_amount: Decimal,
    pub paid_amount: Decimal,
    /// Approved plus paid.
    pub total_earnings: Decimal,
}
