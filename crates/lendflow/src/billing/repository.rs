use chrono::{DateTime, Utc};

use super::domain::{Subscription, SubscriptionId, SubscriptionPlan, TokenUsage, UsageSummary};

/// Storage abstraction for subscriptions, the usage ledger, and the
/// period summaries derived from it.
///
/// Implementations must apply each call atomically; `usage_between` is
/// inclusive on both period bounds.
pub trait BillingRepository: Send + Sync {
    fn fetch_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError>;
    fn insert_usage(&self, usage: TokenUsage) -> Result<TokenUsage, RepositoryError>;
    fn usage_between(
        &self,
        subscription_id: &SubscriptionId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<TokenUsage>, RepositoryError>;
    fn fetch_summary(
        &self,
        subscription_id: &SubscriptionId,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageSummary>, RepositoryError>;
    fn upsert_summary(&self, summary: UsageSummary) -> Result<(), RepositoryError>;
    fn active_plans(&self) -> Result<Vec<SubscriptionPlan>, RepositoryError>;
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
