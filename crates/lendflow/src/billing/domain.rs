use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The billing and workspace boundary a subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

/// Metered resource classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    Llm,
    Voice,
}

impl UsageType {
    pub const fn label(self) -> &'static str {
        match self {
            UsageType::Llm => "llm",
            UsageType::Voice => "voice",
        }
    }
}

/// Billing state of a subscription; only `active` subscriptions meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }
}

/// A purchasable plan with its monthly token allowances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub llm_tokens_limit: i64,
    pub voice_tokens_limit: i64,
    pub is_active: bool,
}

/// A group's subscription to a plan, with its current billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub group_id: GroupId,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Append-only ledger row: one metered event. Immutable once created;
/// the sole source of truth for consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub id: Uuid,
    pub subscription_id: SubscriptionId,
    pub group_id: GroupId,
    pub usage_type: UsageType,
    pub tokens_used: i64,
    pub user_id: Option<Uuid>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const WARNING_THRESHOLD_PERCENT: i64 = 80;
pub(crate) const LIMIT_THRESHOLD_PERCENT: i64 = 100;

/// Period-scoped aggregate of ledger totals against the plan limits that
/// were in force when the summary was created.
///
/// The warning/limit flags are monotonic within a period: once set they
/// are never cleared, even if a correction drops the totals back under a
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub id: Uuid,
    pub subscription_id: SubscriptionId,
    pub group_id: GroupId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub llm_tokens_used: i64,
    pub voice_tokens_used: i64,
    pub llm_tokens_limit: i64,
    pub voice_tokens_limit: i64,
    pub llm_warning_sent: bool,
    pub voice_warning_sent: bool,
    pub llm_limit_reached: bool,
    pub voice_limit_reached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageSummary {
    /// Consumption as a percentage of the period limit. A zero limit
    /// reads as zero percent rather than dividing by zero.
    ///
    /// Comparisons against the 80/100 thresholds always use this
    /// unrounded value; rounding happens only in views.
    pub fn usage_percentage(&self, usage_type: UsageType) -> Decimal {
        let (used, limit) = match usage_type {
            UsageType::Llm => (self.llm_tokens_used, self.llm_tokens_limit),
            UsageType::Voice => (self.voice_tokens_used, self.voice_tokens_limit),
        };
        if limit == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(used) / Decimal::from(limit) * Decimal::from(100)
    }

    pub fn needs_warning(&self) -> bool {
        let threshold = Decimal::from(WARNING_THRESHOLD_PERCENT);
        self.usage_percentage(UsageType::Llm) >= threshold
            || self.usage_percentage(UsageType::Voice) >= threshold
    }

    pub fn over_limit(&self) -> bool {
        let threshold = Decimal::from(LIMIT_THRESHOLD_PERCENT);
        self.usage_percentage(UsageType::Llm) >= threshold
            || self.usage_percentage(UsageType::Voice) >= threshold
    }

    /// Re-evaluates the threshold flags from the cached totals. Flags
    /// only ever move from false to true.
    pub(crate) fn refresh_flags(&mut self) {
        let warning = Decimal::from(WARNING_THRESHOLD_PERCENT);
        let limit = Decimal::from(LIMIT_THRESHOLD_PERCENT);

        let llm = self.usage_percentage(UsageType::Llm);
        if llm >= limit {
            self.llm_limit_reached = true;
        } else if llm >= warning {
            self.llm_warning_sent = true;
        }

        let voice = self.usage_percentage(UsageType::Voice);
        if voice >= limit {
            self.voice_limit_reached = true;
        } else if voice >= warning {
            self.voice_warning_sent = true;
        }
    }
}
