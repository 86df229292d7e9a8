use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

use super::domain::{
    GroupId, Subscription, SubscriptionId, SubscriptionStatus, TokenUsage, UsageSummary,
    UsageType, LIMIT_THRESHOLD_PERCENT, WARNING_THRESHOLD_PERCENT,
};
use super::repository::{BillingRepository, RepositoryError};

/// Meters token consumption per subscription per billing period.
///
/// Every recorded event synchronously re-aggregates the period summary
/// from the ledger, so callers observe up-to-date totals and flags as
/// soon as `record_usage` returns.
pub struct UsageMeteringService<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> UsageMeteringService<R>
where
    R: BillingRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Appends a ledger row for an active subscription and recomputes
    /// the current-period summary before returning.
    pub fn record_usage(
        &self,
        subscription_id: &SubscriptionId,
        usage_type: UsageType,
        tokens_used: i64,
        user_id: Option<Uuid>,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<TokenUsage, UsageError> {
        let subscription = self.fetch(subscription_id)?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(UsageError::SubscriptionNotActive {
                status: subscription.status,
            });
        }

        let usage = TokenUsage {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            group_id: subscription.group_id,
            usage_type,
            tokens_used,
            user_id,
            metadata: metadata.unwrap_or_default(),
            created_at: self.clock.now(),
        };
        let stored = self.repository.insert_usage(usage)?;

        self.refresh_summary(&subscription)?;

        info!(
            subscription = %subscription.id.0,
            usage_type = usage_type.label(),
            tokens = tokens_used,
            "recorded token usage"
        );
        Ok(stored)
    }

    /// Recomputes the current-period summary as a full re-aggregation of
    /// the ledger: correct regardless of insertion order or back-dating.
    /// Threshold flags are only ever raised, never cleared.
    pub fn refresh_summary(
        &self,
        subscription: &Subscription,
    ) -> Result<UsageSummary, UsageError> {
        let mut summary = self.get_or_create_summary(subscription)?;

        let rows = self.repository.usage_between(
            &subscription.id,
            summary.period_start,
            summary.period_end,
        )?;

        summary.llm_tokens_used = rows
            .iter()
            .filter(|row| row.usage_type == UsageType::Llm)
            .map(|row| row.tokens_used)
            .sum();
        summary.voice_tokens_used = rows
            .iter()
            .filter(|row| row.usage_type == UsageType::Voice)
            .map(|row| row.tokens_used)
            .sum();

        summary.refresh_flags();
        summary.updated_at = self.clock.now();
        self.repository.upsert_summary(summary.clone())?;

        Ok(summary)
    }

    /// Current-period usage against plan limits, created lazily on first
    /// access.
    pub fn usage_summary(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<UsageSummaryView, UsageError> {
        let subscription = self.fetch(subscription_id)?;
        let summary = self.get_or_create_summary(&subscription)?;
        Ok(UsageSummaryView::build(&subscription, &summary))
    }

    /// Pure read used to gate consumption and prompt upgrades: derives
    /// warnings from the stored summary without writing anything.
    pub fn check_usage_limits(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<UsageLimitReport, UsageError> {
        let subscription = self.fetch(subscription_id)?;
        let (period_start, period_end) = self.current_period(&subscription);
        let summary = match self
            .repository
            .fetch_summary(&subscription.id, period_start)?
        {
            Some(summary) => summary,
            // nothing recorded this period yet; evaluate an empty summary
            // without persisting it
            None => self.blank_summary(&subscription, period_start, period_end),
        };

        let mut warnings = Vec::new();
        for usage_type in [UsageType::Llm, UsageType::Voice] {
            let percentage = summary.usage_percentage(usage_type);
            if percentage >= Decimal::from(LIMIT_THRESHOLD_PERCENT) {
                warnings.push(UsageWarning {
                    severity: WarningSeverity::Error,
                    category: usage_type.label(),
                    message: format!(
                        "{} token limit reached! Upgrade to continue.",
                        limit_display(usage_type)
                    ),
                    percentage: percentage.round_dp(2),
                });
            } else if percentage >= Decimal::from(WARNING_THRESHOLD_PERCENT) {
                warnings.push(UsageWarning {
                    severity: WarningSeverity::Warning,
                    category: usage_type.label(),
                    message: format!(
                        "You have used {}% of your {} tokens.",
                        percentage.round_dp(0),
                        warning_display(usage_type)
                    ),
                    percentage: percentage.round_dp(2),
                });
            }
        }

        let suggested_upgrade = if warnings.is_empty() {
            None
        } else {
            self.suggest_upgrade(&subscription)?
        };

        Ok(UsageLimitReport {
            has_warnings: !warnings.is_empty(),
            over_limit: summary.over_limit(),
            warnings,
            suggested_upgrade,
        })
    }

    /// The cheapest active plan priced strictly above the current one.
    pub fn suggest_upgrade(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<PlanSuggestion>, UsageError> {
        let mut plans: Vec<_> = self
            .repository
            .active_plans()?
            .into_iter()
            .filter(|plan| plan.price > subscription.plan.price)
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price));

        Ok(plans.into_iter().next().map(|plan| PlanSuggestion {
            plan_id: plan.id,
            plan_name: plan.name,
            price: plan.price,
            llm_tokens_limit: plan.llm_tokens_limit,
            voice_tokens_limit: plan.voice_tokens_limit,
        }))
    }

    fn fetch(&self, subscription_id: &SubscriptionId) -> Result<Subscription, UsageError> {
        self.repository
            .fetch_subscription(subscription_id)?
            .ok_or(UsageError::SubscriptionNotFound)
    }

    /// Billing period for the subscription, falling back to the first of
    /// the current month plus thirty days when none is set.
    fn current_period(&self, subscription: &Subscription) -> (DateTime<Utc>, DateTime<Utc>) {
        let period_start = subscription
            .current_period_start
            .unwrap_or_else(|| first_of_month(self.clock.now()));
        let period_end = subscription
            .current_period_end
            .unwrap_or(period_start + Duration::days(30));
        (period_start, period_end)
    }

    fn get_or_create_summary(
        &self,
        subscription: &Subscription,
    ) -> Result<UsageSummary, UsageError> {
        let (period_start, period_end) = self.current_period(subscription);
        if let Some(summary) = self
            .repository
            .fetch_summary(&subscription.id, period_start)?
        {
            return Ok(summary);
        }

        let summary = self.blank_summary(subscription, period_start, period_end);
        self.repository.upsert_summary(summary.clone())?;
        Ok(summary)
    }

    /// Limits are captured from the plan at creation time; a later plan
    /// change does not rewrite an existing period's limits.
    fn blank_summary(
        &self,
        subscription: &Subscription,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> UsageSummary {
        let now = self.clock.now();
        UsageSummary {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            group_id: subscription.group_id,
            period_start,
            period_end,
            llm_tokens_used: 0,
            voice_tokens_used: 0,
            llm_tokens_limit: subscription.plan.llm_tokens_limit,
            voice_tokens_limit: subscription.plan.voice_tokens_limit,
            llm_warning_sent: false,
            voice_warning_sent: false,
            llm_limit_reached: false,
            voice_limit_reached: false,
            created_at: now,
            updated_at: now,
        }
    }
}

fn first_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("first of month is a valid date")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

fn limit_display(usage_type: UsageType) -> &'static str {
    match usage_type {
        UsageType::Llm => "LLM",
        UsageType::Voice => "Voice",
    }
}

fn warning_display(usage_type: UsageType) -> &'static str {
    match usage_type {
        UsageType::Llm => "LLM",
        UsageType::Voice => "voice",
    }
}

/// Error raised by the usage metering service.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("subscription is not active (status: {})", status.label())]
    SubscriptionNotActive { status: SubscriptionStatus },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Per-resource slice of the summary view; percentages are rounded to
/// two decimal places for display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUsageView {
    pub used: i64,
    pub limit: i64,
    pub percentage: Decimal,
    pub warning: bool,
    pub limit_reached: bool,
}

/// Summary of the current billing period for API consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummaryView {
    pub subscription_id: SubscriptionId,
    pub plan_name: String,
    pub group_id: GroupId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub llm: ResourceUsageView,
    pub voice: ResourceUsageView,
    pub needs_warning: bool,
    pub over_limit: bool,
}

impl UsageSummaryView {
    fn build(subscription: &Subscription, summary: &UsageSummary) -> Self {
        Self {
            subscription_id: subscription.id,
            plan_name: subscription.plan.name.clone(),
            group_id: subscription.group_id,
            period_start: summary.period_start,
            period_end: summary.period_end,
            llm: ResourceUsageView {
                used: summary.llm_tokens_used,
                limit: summary.llm_tokens_limit,
                percentage: summary.usage_percentage(UsageType::Llm).round_dp(2),
                warning: summary.llm_warning_sent,
                limit_reached: summary.llm_limit_reached,
            },
            voice: ResourceUsageView {
                used: summary.voice_tokens_used,
                limit: summary.voice_tokens_limit,
                percentage: summary.usage_percentage(UsageType::Voice).round_dp(2),
                warning: summary.voice_warning_sent,
                limit_reached: summary.voice_limit_reached,
            },
            needs_warning: summary.needs_warning(),
            over_limit: summary.over_limit(),
        }
    }
}

/// Severity of a limit warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Warning,
    Error,
}

/// One threshold crossing reported by `check_usage_limits`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageWarning {
    pub severity: WarningSeverity,
    pub category: &'static str,
    pub message: String,
    pub percentage: Decimal,
}

/// Upgrade candidate named alongside warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSuggestion {
    pub plan_id: Uuid,
    pub plan_name: String,
    pub price: Decimal,
    pub llm_tokens_limit: i64,
    pub voice_tokens_limit: i64,
}

/// Result of a limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageLimitReport {
    pub has_warnings: bool,
    pub over_limit: bool,
    pub warnings: Vec<UsageWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_upgrade: Option<PlanSuggestion>,
}
