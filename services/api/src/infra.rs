use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use lendflow::billing::{
    BillingRepository, GroupId, RepositoryError as BillingStoreError, Subscription,
    SubscriptionId, SubscriptionPlan, SubscriptionStatus, TokenUsage, UsageSummary,
};
use lendflow::commissions::{
    Commission, CommissionRepository, CommissionRule, RepositoryError as CommissionStoreError,
    TriggerEvent,
};
use lendflow::workflows::application::{
    ApplicationId, ApplicationProgress, ApplicationRepository, LoanApplication, RepositoryError,
    StatusChange,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryWorkflowRepository {
    applications: Mutex<HashMap<ApplicationId, LoanApplication>>,
    progress: Mutex<HashMap<ApplicationId, ApplicationProgress>>,
    history: Mutex<Vec<StatusChange>>,
}

impl ApplicationRepository for InMemoryWorkflowRepository {
    fn insert_application(
        &self,
        application: LoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        let mut guard = self.applications.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id, application.clone());
        Ok(application)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<LoanApplication>, RepositoryError> {
        let guard = self.applications.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_application(&self, application: LoanApplication) -> Result<(), RepositoryError> {
        let mut guard = self.applications.lock().expect("repository mutex poisoned");
        if guard.contains_key(&application.id) {
            guard.insert(application.id, application);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_progress(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationProgress>, RepositoryError> {
        let guard = self.progress.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn upsert_progress(&self, progress: ApplicationProgress) -> Result<(), RepositoryError> {
        self.progress
            .lock()
            .expect("repository mutex poisoned")
            .insert(progress.application_id(), progress);
        Ok(())
    }

    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError> {
        self.history
            .lock()
            .expect("repository mutex poisoned")
            .push(change);
        Ok(())
    }

    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError> {
        let guard = self.history.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|change| change.application_id == *id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryBillingRepository {
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    usage: Mutex<Vec<TokenUsage>>,
    summaries: Mutex<HashMap<(SubscriptionId, DateTime<Utc>), UsageSummary>>,
    plans: Mutex<Vec<SubscriptionPlan>>,
}

impl InMemoryBillingRepository {
    pub(crate) fn with_plans(plans: Vec<SubscriptionPlan>) -> Self {
        let repository = Self::default();
        *repository.plans.lock().expect("repository mutex poisoned") = plans;
        repository
    }

    pub(crate) fn plan(&self, plan_id: &Uuid) -> Option<SubscriptionPlan> {
        self.plans
            .lock()
            .expect("repository mutex poisoned")
            .iter()
            .find(|plan| plan.id == *plan_id)
            .cloned()
    }

    pub(crate) fn plans(&self) -> Vec<SubscriptionPlan> {
        self.plans.lock().expect("repository mutex poisoned").clone()
    }

    /// Provisioning glue for demos and the subscription endpoint: a new
    /// active subscription on the given plan with a 30-day period.
    pub(crate) fn create_subscription(
        &self,
        group_id: Uuid,
        plan: SubscriptionPlan,
        now: DateTime<Utc>,
    ) -> Subscription {
        let subscription = Subscription {
            id: SubscriptionId::new(),
            group_id: GroupId(group_id),
            plan,
            status: SubscriptionStatus::Active,
            current_period_start: Some(now),
            current_period_end: Some(now + Duration::days(30)),
        };
        self.subscriptions
            .lock()
            .expect("repository mutex poisoned")
            .insert(subscription.id, subscription.clone());
        subscription
    }
}

impl BillingRepository for InMemoryBillingRepository {
    fn fetch_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, BillingStoreError> {
        let guard = self.subscriptions.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert_usage(&self, usage: TokenUsage) -> Result<TokenUsage, BillingStoreError> {
        self.usage
            .lock()
            .expect("repository mutex poisoned")
            .push(usage.clone());
        Ok(usage)
    }

    fn usage_between(
        &self,
        subscription_id: &SubscriptionId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<TokenUsage>, BillingStoreError> {
        let guard = self.usage.lock().expect("repository mutex poisoned");
        Ok(guard
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
    ) -> Result<Option<UsageSummary>, BillingStoreError> {
        let guard = self.summaries.lock().expect("repository mutex poisoned");
        Ok(guard.get(&(*subscription_id, period_start)).cloned())
    }

    fn upsert_summary(&self, summary: UsageSummary) -> Result<(), BillingStoreError> {
        self.summaries
            .lock()
            .expect("repository mutex poisoned")
            .insert((summary.subscription_id, summary.period_start), summary);
        Ok(())
    }

    fn active_plans(&self) -> Result<Vec<SubscriptionPlan>, BillingStoreError> {
        let guard = self.plans.lock().expect("repository mutex poisoned");
        Ok(guard.iter().filter(|plan| plan.is_active).cloned().collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryCommissionRepository {
    commissions: Mutex<HashMap<Uuid, Commission>>,
    rules: Mutex<Vec<CommissionRule>>,
}

impl InMemoryCommissionRepository {
    pub(crate) fn with_rules(rules: Vec<CommissionRule>) -> Self {
        let repository = Self::default();
        *repository.rules.lock().expect("repository mutex poisoned") = rules;
        repository
    }
}

impl CommissionRepository for InMemoryCommissionRepository {
    fn insert(&self, commission: Commission) -> Result<Commission, CommissionStoreError> {
        let mut guard = self.commissions.lock().expect("repository mutex poisoned");
        if guard.contains_key(&commission.id) {
            return Err(CommissionStoreError::Conflict);
        }
        guard.insert(commission.id, commission.clone());
        Ok(commission)
    }

    fn update(&self, commission: Commission) -> Result<(), CommissionStoreError> {
        let mut guard = self.commissions.lock().expect("repository mutex poisoned");
        if guard.contains_key(&commission.id) {
            guard.insert(commission.id, commission);
            Ok(())
        } else {
            Err(CommissionStoreError::NotFound)
        }
    }

    fn fetch(&self, id: &Uuid) -> Result<Option<Commission>, CommissionStoreError> {
        let guard = self.commissions.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_for_event(
        &self,
        application_id: &ApplicationId,
        trigger: TriggerEvent,
    ) -> Result<Option<Commission>, CommissionStoreError> {
        let guard = self.commissions.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|commission| {
                commission.application_id == *application_id && commission.trigger == trigger
            })
            .cloned())
    }

    fn for_broker(&self, broker_id: &Uuid) -> Result<Vec<Commission>, CommissionStoreError> {
        let guard = self.commissions.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|commission| commission.broker_id == *broker_id)
            .cloned()
            .collect())
    }

    fn active_rules_for(
        &self,
        trigger: TriggerEvent,
    ) -> Result<Vec<CommissionRule>, CommissionStoreError> {
        let guard = self.rules.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|rule| rule.is_active && rule.trigger == trigger)
            .cloned()
            .collect())
    }
}

/// Plan catalog used when no billing backend is wired in.
pub(crate) fn default_plan_catalog() -> Vec<SubscriptionPlan> {
    vec![
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            price: Decimal::new(4900, 2),
            llm_tokens_limit: 100_000,
            voice_tokens_limit: 50_000,
            is_active: true,
        },
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Growth".to_string(),
            price: Decimal::new(9900, 2),
            llm_tokens_limit: 500_000,
            voice_tokens_limit: 100_000,
            is_active: true,
        },
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Scale".to_string(),
            price: Decimal::new(19900, 2),
            llm_tokens_limit: 2_000_000,
            voice_tokens_limit: 500_000,
            is_active: true,
        },
    ]
}

/// Referral rules used when no commission backend is wired in.
pub(crate) fn standard_commission_rules() -> Vec<CommissionRule> {
    vec![
        CommissionRule {
            id: Uuid::new_v4(),
            name: "Approved referral".to_string(),
            description: "Flat accrual when a referred application is approved".to_string(),
            trigger: TriggerEvent::ApplicationApproved,
            rate: Decimal::new(50, 2),
            minimum_amount: Some(Decimal::from(100)),
            maximum_amount: Some(Decimal::from(2_500)),
            is_active: true,
        },
        CommissionRule {
            id: Uuid::new_v4(),
            name: "Funded referral".to_string(),
            description: "Main referral payout when the loan is funded".to_string(),
            trigger: TriggerEvent::LoanFunded,
            rate: Decimal::new(150, 2),
            minimum_amount: Some(Decimal::from(250)),
            maximum_amount: Some(Decimal::from(15_000)),
            is_active: true,
        },
    ]
}
