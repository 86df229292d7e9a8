//! Broker commission accrual and settlement.
//!
//! The engine listens to application workflow events; a matching active
//! rule turns an event into a pending commission, clamped to the rule's
//! payout bounds, at most once per (application, trigger).

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    Commission, CommissionRule, CommissionStatus, EarningsSummary, TriggerEvent,
};
pub use repository::{CommissionRepository, RepositoryError};
pub use service::{CommissionEngine, CommissionError};
