use uuid::Uuid;

use super::domain::{Commission, CommissionRule, TriggerEvent};
use crate::workflows::application::domain::ApplicationId;

/// Storage abstraction for commissions and the rate rules that drive them.
pub trait CommissionRepository: Send + Sync {
    fn insert(&self, commission: Commission) -> Result<Commission, RepositoryError>;
    fn update(&self, commission: Commission) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &Uuid) -> Result<Option<Commission>, RepositoryError>;
    /// The commission already accrued for this (application, trigger)
    /// pair, if any; used to keep accrual idempotent per event.
    fn find_for_event(
        &self,
        application_id: &ApplicationId,
        trigger: TriggerEvent,
    ) -> Result<Option<Commission>, RepositoryError>;
    fn for_broker(&self, broker_id: &Uuid) -> Result<Vec<Commission>, RepositoryError>;
    fn active_rules_for(&self, trigger: TriggerEvent)
        -> Result<Vec<CommissionRule>, RepositoryError>;
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
