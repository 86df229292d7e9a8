use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::FixedClock;
use crate::workflows::application::domain::{
    ActorRef, ActorRole, ApplicationEvent, ApplicationId, LoanApplication, NewApplication,
    StatusChange,
};
use crate::workflows::application::progress::ApplicationProgress;
use crate::workflows::application::repository::{
    ApplicationEventSink, ApplicationRepository, EventError, RepositoryError,
};
use crate::workflows::application::service::ApplicationWorkflowService;

pub(super) fn review_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap()
}

pub(super) fn operator() -> ActorRef {
    ActorRef {
        id: Uuid::new_v4(),
        role: ActorRole::OrganizationStaff,
    }
}

pub(super) fn admin() -> ActorRef {
    ActorRef {
        id: Uuid::new_v4(),
        role: ActorRole::SystemAdmin,
    }
}

pub(super) fn applicant_actor() -> ActorRef {
    ActorRef {
        id: Uuid::new_v4(),
        role: ActorRole::Applicant,
    }
}

pub(super) fn new_application() -> NewApplication {
    NewApplication {
        applicant_id: Uuid::new_v4(),
        broker_id: Some(Uuid::new_v4()),
        loan_purpose: "working capital".to_string(),
        loan_amount: Decimal::from(250000),
        loan_term_months: Some(48),
        interest_rate: None,
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    applications: Mutex<HashMap<ApplicationId, LoanApplication>>,
    progress: Mutex<HashMap<ApplicationId, ApplicationProgress>>,
    history: Mutex<Vec<StatusChange>>,
}

impl MemoryRepository {
    pub(super) fn history_for(&self, id: &ApplicationId) -> Vec<StatusChange> {
        self.history
            .lock()
            .expect("lock")
            .iter()
            .filter(|change| change.application_id == *id)
            .cloned()
            .collect()
    }

    pub(super) fn drop_progress(&self, id: &ApplicationId) {
        self.progress.lock().expect("lock").remove(id);
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert_application(
        &self,
        application: LoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        let mut guard = self.applications.lock().expect("lock");
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
        Ok(self.applications.lock().expect("lock").get(id).cloned())
    }

    fn update_application(&self, application: LoanApplication) -> Result<(), RepositoryError> {
        let mut guard = self.applications.lock().expect("lock");
        if !guard.contains_key(&application.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(application.id, application);
        Ok(())
    }

    fn fetch_progress(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationProgress>, RepositoryError> {
        Ok(self.progress.lock().expect("lock").get(id).cloned())
    }

    fn upsert_progress(&self, progress: ApplicationProgress) -> Result<(), RepositoryError> {
        self.progress
            .lock()
            .expect("lock")
            .insert(progress.application_id(), progress);
        Ok(())
    }

    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError> {
        self.history.lock().expect("lock").push(change);
        Ok(())
    }

    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError> {
        Ok(self.history_for(id))
    }
}

/// Repository that refuses every call, for surfacing backend failures.
pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert_application(
        &self,
        _application: LoanApplication,
    ) -> Result<LoanApplication, RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn fetch_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<LoanApplication>, RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn update_application(&self, _application: LoanApplication) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn fetch_progress(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<ApplicationProgress>, RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn upsert_progress(&self, _progress: ApplicationProgress) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn append_status_change(&self, _change: StatusChange) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }

    fn status_history(&self, _id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError> {
        Err(RepositoryError::Unavailable("backend offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryEvents {
    published: Mutex<Vec<ApplicationEvent>>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<ApplicationEvent> {
        self.published.lock().expect("lock").clone()
    }
}

impl ApplicationEventSink for MemoryEvents {
    fn publish(&self, event: ApplicationEvent) -> Result<(), EventError> {
        self.published.lock().expect("lock").push(event);
        Ok(())
    }
}

pub(super) type TestService = ApplicationWorkflowService<MemoryRepository, MemoryEvents>;

pub(super) fn build_service() -> (
    Arc<TestService>,
    Arc<MemoryRepository>,
    Arc<MemoryEvents>,
    Arc<FixedClock>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let events = Arc::new(MemoryEvents::default());
    let clock = Arc::new(FixedClock::new(review_start()));
    let service = Arc::new(ApplicationWorkflowService::with_clock(
        repository.clone(),
        events.clone(),
        clock.clone(),
    ));
    (service, repository, events, clock)
}
