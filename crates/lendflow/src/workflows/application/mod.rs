//! Loan application intake and the six-step review workflow.
//!
//! The progress state machine lives in [`progress`]; the service in
//! [`service`] layers authorization, the canonical status writer, and
//! event publication on top of a storage trait so the workflow can be
//! exercised against in-memory adapters.

pub mod domain;
pub mod progress;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ActorRef, ActorRole, ApplicationEvent, ApplicationId, ApplicationNumber, ApplicationStatus,
    LoanApplication, NewApplication, ReviewDecision, StatusChange, StepPayload, StepRecord,
    WorkflowStep,
};
pub use progress::{ApplicationProgress, StepError};
pub use repository::{
    ApplicationEventSink, ApplicationRepository, ApplicationView, EventError, ProgressView,
    RepositoryError, StatusChangeView, StepView,
};
pub use router::application_router;
pub use service::{ApplicationWorkflowService, WorkflowError};
