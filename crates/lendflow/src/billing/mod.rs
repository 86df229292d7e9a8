//! Subscription usage metering.
//!
//! `TokenUsage` rows are the append-only source of truth; the
//! period-scoped `UsageSummary` caches re-aggregated totals against the
//! plan limits captured when the period opened, and raises monotonic
//! warning/limit flags at 80% and 100%.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

pub use domain::{
    GroupId, Subscription, SubscriptionId, SubscriptionPlan, SubscriptionStatus, TokenUsage,
    UsageSummary, UsageType,
};
pub use repository::{BillingRepository, RepositoryError};
pub use router::billing_router;
pub use service::{
    PlanSuggestion, ResourceUsageView, UsageError, UsageLimitReport, UsageMeteringService,
    UsageSummaryView, UsageWarning, WarningSeverity,
};
