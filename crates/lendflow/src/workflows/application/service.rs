use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::commissions::TriggerEvent;

use super::domain::{
    ActorRef, ActorRole, ApplicationEvent, ApplicationId, ApplicationNumber, ApplicationStatus,
    LoanApplication, NewApplication, ReviewDecision, StatusChange, StepPayload, WorkflowStep,
};
use super::progress::{ApplicationProgress, StepError};
use super::repository::{
    ApplicationEventSink, ApplicationRepository, EventError, RepositoryError,
};

/// Service driving applications through the six-step review workflow.
///
/// All status mutations funnel through one internal writer so that every
/// change appends exactly one history row and publishes its workflow
/// event; nothing else in the crate assigns `LoanApplication::status`.
pub struct ApplicationWorkflowService<R, E> {
    repository: Arc<R>,
    events: Arc<E>,
    clock: Arc<dyn Clock>,
}

impl<R, E> ApplicationWorkflowService<R, E>
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    pub fn new(repository: Arc<R>, events: Arc<E>) -> Self {
        Self::with_clock(repository, events, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, events: Arc<E>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            events,
            clock,
        }
    }

    /// Opens a new application in `pending` status with a generated
    /// application number, the initial history row, and a progress
    /// record whose submission step is already completed.
    pub fn create(&self, input: NewApplication) -> Result<LoanApplication, WorkflowError> {
        let now = self.clock.now();
        let application = LoanApplication {
            id: ApplicationId::new(),
            application_number: ApplicationNumber::generate(),
            applicant_id: input.applicant_id,
            broker_id: input.broker_id,
            loan_purpose: input.loan_purpose,
            loan_amount: input.loan_amount,
            loan_term_months: input.loan_term_months,
            interest_rate: input.interest_rate,
            status: ApplicationStatus::Pending,
            submission_date: None,
            decision_date: None,
            funding_date: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repository.insert_application(application)?;
        self.repository.append_status_change(StatusChange {
            id: Uuid::new_v4(),
            application_id: stored.id,
            status: ApplicationStatus::Pending,
            notes: Some("Application created".to_string()),
            changed_by: None,
            created_at: now,
        })?;
        self.repository
            .upsert_progress(ApplicationProgress::start(stored.id, now))?;

        info!(
            application = %stored.application_number.0,
            "created loan application"
        );
        Ok(stored)
    }

    /// Moves a pending application into `submitted`.
    pub fn submit(
        &self,
        application_id: &ApplicationId,
        actor: Option<&ActorRef>,
    ) -> Result<LoanApplication, WorkflowError> {
        let application = self.fetch(application_id)?;
        if application.status != ApplicationStatus::Pending {
            return Err(WorkflowError::AlreadySubmitted);
        }

        self.apply_status(
            application,
            ApplicationStatus::Submitted,
            Some("Application submitted for review".to_string()),
            actor,
        )
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<LoanApplication, WorkflowError> {
        self.fetch(application_id)
    }

    /// Progress for an application, created on first access.
    pub fn get_progress(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationProgress, WorkflowError> {
        let application = self.fetch(application_id)?;
        self.progress_for(&application)
    }

    /// Marks a review step completed on behalf of a workflow operator.
    ///
    /// A recorded final-approval decision additionally drives the
    /// application status (and therefore the history trail) through the
    /// canonical status writer.
    pub fn complete_step(
        &self,
        application_id: &ApplicationId,
        step: u8,
        actor: &ActorRef,
        notes: Option<String>,
        payload: Option<StepPayload>,
    ) -> Result<ApplicationProgress, WorkflowError> {
        self.authorize(actor)?;
        let step = WorkflowStep::from_index(step)
            .ok_or(WorkflowError::Step(StepError::InvalidStep { step }))?;

        let application = self.fetch(application_id)?;
        let mut progress = self.progress_for(&application)?;

        let now = self.clock.now();
        let decision = progress.complete_step(step, actor.id, notes, payload, now)?;
        self.repository.upsert_progress(progress.clone())?;

        info!(
            application = %application.application_number.0,
            step = step.index(),
            "review step completed"
        );

        if let Some(decision) = decision {
            self.apply_status(
                application,
                decision.status(),
                Some(format!("Final approval decision: {}", decision.label())),
                Some(actor),
            )?;
        }

        Ok(progress)
    }

    /// Administrative override: parks the progress pointer on an
    /// arbitrary step and drives the application status through the
    /// fixed step-to-status mapping.
    ///
    /// The override can leave the pointer out of sync with the
    /// completion slots; that divergence is intentional and is surfaced
    /// to operators via a warning.
    pub fn set_current_step(
        &self,
        application_id: &ApplicationId,
        step: u8,
        actor: &ActorRef,
        decision: Option<ReviewDecision>,
        notes: Option<String>,
    ) -> Result<ApplicationProgress, WorkflowError> {
        self.authorize(actor)?;
        let step = WorkflowStep::from_index(step)
            .ok_or(WorkflowError::Step(StepError::InvalidStep { step }))?;

        let application = self.fetch(application_id)?;
        let mut progress = self.progress_for(&application)?;

        let now = self.clock.now();
        progress.force_current_step(step, now);
        self.repository.upsert_progress(progress.clone())?;

        if !progress.pointer_is_consistent() {
            warn!(
                application = %application.application_number.0,
                step = step.index(),
                "step override left the pointer ahead of uncompleted steps"
            );
        }

        let status = match step {
            WorkflowStep::Submitted => None,
            WorkflowStep::InitialReview => Some(ApplicationStatus::UnderReview),
            WorkflowStep::DocumentVerification => Some(ApplicationStatus::DocumentsVerified),
            WorkflowStep::CreditCheck => Some(ApplicationStatus::CreditCheck),
            WorkflowStep::FinalApproval => {
                Some(decision.map_or(ApplicationStatus::UnderReview, ReviewDecision::status))
            }
            WorkflowStep::Funding => Some(ApplicationStatus::Funded),
        };

        if let Some(status) = status {
            self.apply_status(application, status, notes, Some(actor))?;
        }

        Ok(progress)
    }

    /// The canonical status writer exposed to the surrounding layer.
    pub fn update_status(
        &self,
        application_id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
        actor: Option<&ActorRef>,
    ) -> Result<LoanApplication, WorkflowError> {
        let application = self.fetch(application_id)?;
        self.apply_status(application, status, notes, actor)
    }

    pub fn status_history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusChange>, WorkflowError> {
        self.fetch(application_id)?;
        Ok(self.repository.status_history(application_id)?)
    }

    fn fetch(&self, application_id: &ApplicationId) -> Result<LoanApplication, WorkflowError> {
        self.repository
            .fetch_application(application_id)?
            .ok_or(WorkflowError::ApplicationNotFound)
    }

    fn progress_for(
        &self,
        application: &LoanApplication,
    ) -> Result<ApplicationProgress, WorkflowError> {
        if let Some(progress) = self.repository.fetch_progress(&application.id)? {
            return Ok(progress);
        }

        let progress = ApplicationProgress::start(application.id, self.clock.now());
        self.repository.upsert_progress(progress.clone())?;
        Ok(progress)
    }

    fn authorize(&self, actor: &ActorRef) -> Result<(), WorkflowError> {
        if actor.role.is_workflow_operator() {
            Ok(())
        } else {
            Err(WorkflowError::NotAuthorized { role: actor.role })
        }
    }

    /// Sole writer of `LoanApplication::status`: stamps lifecycle dates,
    /// persists the application, appends exactly one history row, and
    /// publishes the matching workflow event.
    fn apply_status(
        &self,
        mut application: LoanApplication,
        status: ApplicationStatus,
        notes: Option<String>,
        actor: Option<&ActorRef>,
    ) -> Result<LoanApplication, WorkflowError> {
        let now = self.clock.now();
        let old_status = application.status;
        application.status = status;
        match status {
            ApplicationStatus::Submitted => application.submission_date = Some(now),
            ApplicationStatus::Approved | ApplicationStatus::Rejected => {
                application.decision_date = Some(now)
            }
            ApplicationStatus::Funded => application.funding_date = Some(now),
            _ => {}
        }
        application.updated_at = now;

        self.repository.update_application(application.clone())?;
        self.repository.append_status_change(StatusChange {
            id: Uuid::new_v4(),
            application_id: application.id,
            status,
            notes: notes.or_else(|| {
                Some(format!(
                    "Status changed from {} to {}",
                    old_status.label(),
                    status.label()
                ))
            }),
            changed_by: actor.map(|actor| actor.id),
            created_at: now,
        })?;

        let trigger = match status {
            ApplicationStatus::Submitted => Some(TriggerEvent::ApplicationSubmitted),
            ApplicationStatus::Approved => Some(TriggerEvent::ApplicationApproved),
            ApplicationStatus::Funded => Some(TriggerEvent::LoanFunded),
            _ => None,
        };
        if let Some(trigger) = trigger {
            self.events.publish(ApplicationEvent {
                application_id: application.id,
                application_number: application.application_number.clone(),
                broker_id: application.broker_id,
                loan_amount: application.loan_amount,
                trigger,
            })?;
        }

        info!(
            application = %application.application_number.0,
            from = old_status.label(),
            to = status.label(),
            "application status updated"
        );
        Ok(application)
    }
}

/// Error raised by the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("role `{role:?}` may not operate the review workflow")]
    NotAuthorized { role: ActorRole },
    #[error("application not found")]
    ApplicationNotFound,
    #[error("application has already been submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Event(#[from] EventError),
}
