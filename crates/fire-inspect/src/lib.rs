//! Fire-safety inspection scheduling and lifecycle engine.
//!
//! The crate owns the inspection state machine, the inspector availability rules, the
//! expiry sweep that runs on every read, and the synchronizer that keeps inspections,
//! applications, and establishments consistent. Persistence and notification delivery are
//! consumed through traits in [`workflows::inspections::repository`].

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
