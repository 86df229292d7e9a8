use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::workflows::application::domain::ApplicationEvent;
use crate::workflows::application::repository::{ApplicationEventSink, EventError};

use super::domain::{Commission, CommissionStatus, EarningsSummary};
use super::repository::{CommissionRepository, RepositoryError};

/// Accrues and settles broker commissions from application events.
pub struct CommissionEngine<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> CommissionEngine<R>
where
    R: CommissionRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Accrues a pending commission for the event, if a broker referred
    /// the application and an active rule matches the trigger. At most
    /// one commission exists per (application, trigger); repeat events
    /// are ignored.
    pub fn handle_event(
        &self,
        event: &ApplicationEvent,
    ) -> Result<Option<Commission>, CommissionError> {
        let Some(broker_id) = event.broker_id else {
            debug!(
                application = %event.application_number.0,
                "no referring broker, skipping commission"
            );
            return Ok(None);
        };

        if self
            .repository
            .find_for_event(&event.application_id, event.trigger)?
            .is_some()
        {
            debug!(
                application = %event.application_number.0,
                trigger = event.trigger.label(),
                "commission already accrued for event"
            );
            return Ok(None);
        }

        let rules = self.repository.active_rules_for(event.trigger)?;
        let Some(rule) = rules.first() else {
            debug!(
                trigger = event.trigger.label(),
                "no active commission rule for trigger"
            );
            return Ok(None);
        };

        let mut amount = event.loan_amount * rule.rate / Decimal::from(100);
        if let Some(minimum) = rule.minimum_amount {
            if amount < minimum {
                amount = minimum;
            }
        }
        if let Some(maximum) = rule.maximum_amount {
            if amount > maximum {
                amount = maximum;
            }
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("trigger_event".to_string(), event.trigger.label().to_string());
        metadata.insert("rule_id".to_string(), rule.id.to_string());
        metadata.insert("base_amount".to_string(), event.loan_amount.to_string());

        let commission = Commission {
            id: Uuid::new_v4(),
            broker_id,
            application_id: event.application_id,
            trigger: event.trigger,
            amount,
            rate: rule.rate,
            status: CommissionStatus::Pending,
            metadata,
            calculated_at: self.clock.now(),
            approved_at: None,
            paid_at: None,
            payment_reference: None,
        };

        let stored = self.repository.insert(commission)?;
        info!(
            application = %event.application_number.0,
            amount = %stored.amount,
            "accrued broker commission"
        );
        Ok(Some(stored))
    }

    /// pending → approved.
    pub fn approve(
        &self,
        commission_id: &Uuid,
        approved_by: Option<Uuid>,
    ) -> Result<Commission, CommissionError> {
        let mut commission = self.fetch(commission_id)?;
        if commission.status != CommissionStatus::Pending {
            return Err(CommissionError::InvalidTransition {
                from: commission.status,
                to: CommissionStatus::Approved,
            });
        }

        commission.status = CommissionStatus::Approved;
        commission.approved_at = Some(self.clock.now());
        if let Some(approved_by) = approved_by {
            commission
                .metadata
                .insert("approved_by".to_string(), approved_by.to_string());
        }

        self.repository.update(commission.clone())?;
        Ok(commission)
    }

    /// approved → paid, stamping the payment reference.
    pub fn mark_paid(
        &self,
        commission_id: &Uuid,
        payment_reference: &str,
    ) -> Result<Commission, CommissionError> {
        let mut commission = self.fetch(commission_id)?;
        if commission.status != CommissionStatus::Approved {
            return Err(CommissionError::InvalidTransition {
                from: commission.status,
                to: CommissionStatus::Paid,
            });
        }

        commission.status = CommissionStatus::Paid;
        commission.paid_at = Some(self.clock.now());
        commission.payment_reference = Some(payment_reference.to_string());

        self.repository.update(commission.clone())?;
        Ok(commission)
    }

    /// pending or approved → cancelled.
    pub fn cancel(&self, commission_id: &Uuid) -> Result<Commission, CommissionError> {
        let mut commission = self.fetch(commission_id)?;
        if !matches!(
            commission.status,
            CommissionStatus::Pending | CommissionStatus::Approved
        ) {
            return Err(CommissionError::InvalidTransition {
                from: commission.status,
                to: CommissionStatus::Cancelled,
            });
        }

        commission.status = CommissionStatus::Cancelled;
        self.repository.update(commission.clone())?;
        Ok(commission)
    }

    /// Earnings rolled up by status for one broker.
    pub fn earnings_summary(&self, broker_id: &Uuid) -> Result<EarningsSummary, CommissionError> {
        let commissions = self.repository.for_broker(broker_id)?;

        let mut summary = EarningsSummary {
            total_commissions: commissions.len(),
            pending_amount: Decimal::ZERO,
            approved_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
        };

        for commission in &commissions {
            match commission.status {
                CommissionStatus::Pending => summary.pending_amount += commission.amount,
                CommissionStatus::Approved => summary.approved_amount += commission.amount,
                CommissionStatus::Paid => summary.paid_amount += commission.amount,
                CommissionStatus::Cancelled | CommissionStatus::Disputed => {}
            }
            if matches!(
                commission.status,
                CommissionStatus::Approved | CommissionStatus::Paid
            ) {
                summary.total_earnings += commission.amount;
            }
        }

        Ok(summary)
    }

    fn fetch(&self, commission_id: &Uuid) -> Result<Commission, CommissionError> {
        self.repository
            .fetch(commission_id)?
            .ok_or(CommissionError::NotFound)
    }
}

impl<R> ApplicationEventSink for CommissionEngine<R>
where
    R: CommissionRepository + 'static,
{
    fn publish(&self, event: ApplicationEvent) -> Result<(), EventError> {
        self.handle_event(&event)
            .map(|_| ())
            .map_err(|error| EventError::Delivery(error.to_string()))
    }
}

/// Error raised by the commission engine.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("commission not found")]
    NotFound,
    #[error("commission cannot move from {} to {}", from.label(), to.label())]
    InvalidTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commissions::domain::CommissionRule;
    use crate::commissions::TriggerEvent;
    use crate::workflows::application::domain::{ApplicationId, ApplicationNumber};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCommissions {
        commissions: Mutex<HashMap<Uuid, Commission>>,
        rules: Mutex<Vec<CommissionRule>>,
    }

    impl MemoryCommissions {
        fn with_rule(rule: CommissionRule) -> Self {
            let store = Self::default();
            store.rules.lock().expect("lock").push(rule);
            store
        }
    }

    impl CommissionRepository for MemoryCommissions {
        fn insert(&self, commission: Commission) -> Result<Commission, RepositoryError> {
            let mut guard = self.commissions.lock().expect("lock");
            if guard.contains_key(&commission.id) {
                return Err(RepositoryError::Conflict);
            }
            guard.insert(commission.id, commission.clone());
            Ok(commission)
        }

        fn update(&self, commission: Commission) -> Result<(), RepositoryError> {
            let mut guard = self.commissions.lock().expect("lock");
            if !guard.contains_key(&commission.id) {
                return Err(RepositoryError::NotFound);
            }
            guard.insert(commission.id, commission);
            Ok(())
        }

        fn fetch(&self, id: &Uuid) -> Result<Option<Commission>, RepositoryError> {
            Ok(self.commissions.lock().expect("lock").get(id).cloned())
        }

        fn find_for_event(
            &self,
            application_id: &ApplicationId,
            trigger: TriggerEvent,
        ) -> Result<Option<Commission>, RepositoryError> {
            Ok(self
                .commissions
                .lock()
                .expect("lock")
                .values()
                .find(|commission| {
                    commission.application_id == *application_id && commission.trigger == trigger
                })
                .cloned())
        }

        fn for_broker(&self, broker_id: &Uuid) -> Result<Vec<Commission>, RepositoryError> {
            Ok(self
                .commissions
                .lock()
                .expect("lock")
                .values()
                .filter(|commission| commission.broker_id == *broker_id)
                .cloned()
                .collect())
        }

        fn active_rules_for(
            &self,
            trigger: TriggerEvent,
        ) -> Result<Vec<CommissionRule>, RepositoryError> {
            Ok(self
                .rules
                .lock()
                .expect("lock")
                .iter()
                .filter(|rule| rule.is_active && rule.trigger == trigger)
                .cloned()
                .collect())
        }
    }

    fn funded_rule(minimum: Option<Decimal>, maximum: Option<Decimal>) -> CommissionRule {
        CommissionRule {
            id: Uuid::new_v4(),
            name: "Funded referral".to_string(),
            description: "Standard referral payout on funding".to_string(),
            trigger: TriggerEvent::LoanFunded,
            rate: dec!(1.5),
            minimum_amount: minimum,
            maximum_amount: maximum,
            is_active: true,
        }
    }

    fn funded_event(broker_id: Option<Uuid>, loan_amount: Decimal) -> ApplicationEvent {
        ApplicationEvent {
            application_id: ApplicationId::new(),
            application_number: ApplicationNumber::generate(),
            broker_id,
            loan_amount,
            trigger: TriggerEvent::LoanFunded,
        }
    }

    #[test]
    fn accrues_rate_based_amount() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(None, None)));
        let engine = CommissionEngine::new(repository);

        let commission = engine
            .handle_event(&funded_event(Some(Uuid::new_v4()), dec!(200000)))
            .expect("accrual succeeds")
            .expect("commission accrued");

        assert_eq!(commission.amount, dec!(3000));
        assert_eq!(commission.status, CommissionStatus::Pending);
    }

    #[test]
    fn clamps_to_minimum_and_maximum() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(
            Some(dec!(500)),
            Some(dec!(2000)),
        )));
        let engine = CommissionEngine::new(repository);

        let low = engine
            .handle_event(&funded_event(Some(Uuid::new_v4()), dec!(10000)))
            .expect("accrual succeeds")
            .expect("commission accrued");
        assert_eq!(low.amount, dec!(500));

        let high = engine
            .handle_event(&funded_event(Some(Uuid::new_v4()), dec!(900000)))
            .expect("accrual succeeds")
            .expect("commission accrued");
        assert_eq!(high.amount, dec!(2000));
    }

    #[test]
    fn skips_events_without_broker() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(None, None)));
        let engine = CommissionEngine::new(repository);

        let outcome = engine
            .handle_event(&funded_event(None, dec!(50000)))
            .expect("accrual succeeds");
        assert!(outcome.is_none());
    }

    #[test]
    fn repeat_events_do_not_accrue_twice() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(None, None)));
        let engine = CommissionEngine::new(repository.clone());

        let event = funded_event(Some(Uuid::new_v4()), dec!(80000));
        engine
            .handle_event(&event)
            .expect("first accrual succeeds")
            .expect("commission accrued");
        let second = engine.handle_event(&event).expect("second call succeeds");

        assert!(second.is_none());
        assert_eq!(repository.commissions.lock().expect("lock").len(), 1);
    }

    #[test]
    fn settlement_transitions_are_enforced() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(None, None)));
        let engine = CommissionEngine::new(repository);

        let commission = engine
            .handle_event(&funded_event(Some(Uuid::new_v4()), dec!(120000)))
            .expect("accrual succeeds")
            .expect("commission accrued");

        // paying before approval is rejected
        match engine.mark_paid(&commission.id, "PAYOUT-1") {
            Err(CommissionError::InvalidTransition { from, to }) => {
                assert_eq!(from, CommissionStatus::Pending);
                assert_eq!(to, CommissionStatus::Paid);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }

        let approved = engine
            .approve(&commission.id, Some(Uuid::new_v4()))
            .expect("approval succeeds");
        assert_eq!(approved.status, CommissionStatus::Approved);
        assert!(approved.approved_at.is_some());

        let paid = engine
            .mark_paid(&commission.id, "PAYOUT-1")
            .expect("payment succeeds");
        assert_eq!(paid.status, CommissionStatus::Paid);
        assert_eq!(paid.payment_reference.as_deref(), Some("PAYOUT-1"));

        match engine.cancel(&commission.id) {
            Err(CommissionError::InvalidTransition { from, .. }) => {
                assert_eq!(from, CommissionStatus::Paid);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
    }

    #[test]
    fn earnings_summary_rolls_up_by_status() {
        let repository = Arc::new(MemoryCommissions::with_rule(funded_rule(None, None)));
        let engine = CommissionEngine::new(repository);
        let broker = Uuid::new_v4();

        let first = engine
            .handle_event(&funded_event(Some(broker), dec!(100000)))
            .expect("accrual succeeds")
            .expect("commission accrued");
        let second = engine
            .handle_event(&funded_event(Some(broker), dec!(200000)))
            .expect("accrual succeeds")
            .expect("commission accrued");

        engine.approve(&first.id, None).expect("approval succeeds");
        engine
            .mark_paid(&first.id, "PAYOUT-7")
            .expect("payment succeeds");

        let summary = engine.earnings_summary(&broker).expect("summary builds");
        assert_eq!(summary.total_commissions, 2);
        assert_eq!(summary.paid_amount, first.amount);
        assert_eq!(summary.pending_amount, second.amount);
        assert_eq!(summary.approved_amount, Decimal::ZERO);
        assert_eq!(summary.total_earnings, first.amount);
    }
}
