//! Core library for the lendflow loan-origination platform.
//!
//! Two state-machine subsystems make up the heart of the crate: the
//! application review workflow ([`workflows::application`]) and the
//! subscription usage metering engine ([`billing`]). Commission accrual
//! ([`commissions`]) hangs off workflow events. Storage and the system
//! clock are abstracted behind traits so the services can be exercised
//! against in-memory adapters in tests and demos.

pub mod billing;
pub mod clock;
pub mod commissions;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
