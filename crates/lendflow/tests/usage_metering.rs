//! End-to-end limit-crossing scenario for the usage metering engine.

mod common {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use lendflow::billing::{
        BillingRepository, GroupId, RepositoryError, Subscription, SubscriptionId,
        SubscriptionPlan, SubscriptionStatus, TokenUsage, UsageSummary,
    };

    #[derive(Default)]
    pub struct MemoryBilling {
        subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
        usage: Mutex<Vec<TokenUsage>>,
        summaries: Mutex<HashMap<(SubscriptionId, DateTime<Utc>), UsageSummary>>,
        plans: Mutex<Vec<SubscriptionPlan>>,
    }

    impl MemoryBilling {
        pub fn add_subscription(&self, subscription: Subscription) {
            self.subscriptions
                .lock()
                .expect("lock")
                .insert(subscription.id, subscription);
        }

        pub fn add_plan(&self, plan: SubscriptionPlan) {
            self.plans.lock().expect("lock").push(plan);
        }
    }

    impl BillingRepository for MemoryBilling {
        fn fetch_subscription(
            &self,
            id: &SubscriptionId,
        ) -> Result<Option<Subscription>, RepositoryError> {
            Ok(self.subscriptions.lock().expect("lock").get(id).cloned())
        }

        fn insert_usage(&self, usage: TokenUsage) -> Result<TokenUsage, RepositoryError> {
            self.usage.lock().expect("lock").push(usage.clone());
            Ok(usage)
        }

        fn usage_between(
            &self,
            subscription_id: &SubscriptionId,
            period_start: DateTime<Utc>,
            period_end: DateTime<Utc>,
        ) -> Result<Vec<TokenUsage>, RepositoryError> {
            Ok(self
                .usage
                .lock()
                .expect("lock")
                .iter()
                .filter(|row| {
                    row.subscription_id == *subscription_id
                        && row.created_at >= period_start
                        && row.created_at <= period_end
                })
                .cloned()
                .collect())
        }

        fn fetch_summary(
            &self,
            subscription_id: &SubscriptionId,
            period_start: DateTime<Utc>,
        ) -> Result<Option<UsageSummary>, RepositoryError> {
            Ok(self
                .summaries
                .lock()
                .expect("lock")
                .get(&(*subscription_id, period_start))
                .cloned())
        }

        fn upsert_summary(&self, summary: UsageSummary) -> Result<(), RepositoryError> {
            self.summaries
                .lock()
                .expect("lock")
                .insert((summary.subscription_id, summary.period_start), summary);
            Ok(())
        }

        fn active_plans(&self) -> Result<Vec<SubscriptionPlan>, RepositoryError> {
            Ok(self
                .plans
                .lock()
                .expect("lock")
                .iter()
                .filter(|plan| plan.is_active)
                .cloned()
                .collect())
        }
    }

    pub fn plan(name: &str, price: Decimal, llm_limit: i64, voice_limit: i64) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            llm_tokens_limit: llm_limit,
            voice_tokens_limit: voice_limit,
            is_active: true,
        }
    }

    pub fn starter_subscription() -> Subscription {
        Subscription {
            id: SubscriptionId::new(),
            group_id: GroupId(Uuid::new_v4()),
            plan: plan("Starter", dec!(49), 1000, 500),
            status: SubscriptionStatus::Active,
            current_period_start: Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()),
            current_period_end: Some(Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap()),
        }
    }
}

use std::sync::Arc;

use chrono::TimeZone;
use rust_decimal_macros::dec;

use common::{plan, starter_subscription, MemoryBilling};
use lendflow::billing::{UsageMeteringService, UsageType, WarningSeverity};
use lendflow::clock::FixedClock;

#[test]
fn usage_crosses_warning_then_limit_and_suggests_an_upgrade() {
    let repository = Arc::new(MemoryBilling::default());
    let subscription = starter_subscription();
    repository.add_subscription(subscription.clone());
    repository.add_plan(subscription.plan.clone());
    repository.add_plan(plan("Scale", dec!(199), 2000000, 500000));
    repository.add_plan(plan("Growth", dec!(99), 500000, 100000));

    let clock = Arc::new(FixedClock::new(
        chrono::Utc.with_ymd_and_hms(2026, 5, 12, 10, 0, 0).unwrap(),
    ));
    let service = UsageMeteringService::with_clock(repository, clock);

    service
        .record_usage(&subscription.id, UsageType::Llm, 700, None, None)
        .expect("first batch records");
    let view = service
        .usage_summary(&subscription.id)
        .expect("summary builds");
    assert_eq!(view.llm.used, 700);
    assert_eq!(view.llm.percentage, dec!(70.00));
    assert!(!view.needs_warning);

    service
        .record_usage(&subscription.id, UsageType::Llm, 150, None, None)
        .expect("second batch records");
    let view = service
        .usage_summary(&subscription.id)
        .expect("summary builds");
    assert_eq!(view.llm.used, 850);
    assert!(view.llm.warning);
    assert!(!view.llm.limit_reached);

    service
        .record_usage(&subscription.id, UsageType::Llm, 200, None, None)
        .expect("third batch records");
    let view = service
        .usage_summary(&subscription.id)
        .expect("summary builds");
    assert_eq!(view.llm.used, 1050);
    assert!(view.llm.limit_reached);
    assert!(view.over_limit);

    let report = service
        .check_usage_limits(&subscription.id)
        .expect("check runs");
    assert!(report.has_warnings);
    assert_eq!(report.warnings.len(), 1);
    let warning = &report.warnings[0];
    assert_eq!(warning.severity, WarningSeverity::Error);
    assert_eq!(warning.category, "llm");
    assert_eq!(warning.percentage, dec!(105.00));
    assert!(warning.message.contains("limit reached"));

    let upgrade = report.suggested_upgrade.expect("an upgrade is suggested");
    assert_eq!(upgrade.plan_name, "Growth");
    assert_eq!(upgrade.price, dec!(99));
    assert_eq!(upgrade.llm_tokens_limit, 500000);
}

#[test]
fn voice_and_llm_meters_are_independent() {
    let repository = Arc::new(MemoryBilling::default());
    let subscription = starter_subscription();
    repository.add_subscription(subscription.clone());

    let clock = Arc::new(FixedClock::new(
        chrono::Utc.with_ymd_and_hms(2026, 5, 12, 10, 0, 0).unwrap(),
    ));
    let service = UsageMeteringService::with_clock(repository, clock);

    service
        .record_usage(&subscription.id, UsageType::Voice, 490, None, None)
        .expect("voice usage records");
    let view = service
        .usage_summary(&subscription.id)
        .expect("summary builds");

    assert_eq!(view.voice.used, 490);
    assert_eq!(view.voice.percentage, dec!(98.00));
    assert!(view.voice.warning);
    assert!(!view.voice.limit_reached);
    assert_eq!(view.llm.used, 0);
    assert!(!view.llm.warning);
}
