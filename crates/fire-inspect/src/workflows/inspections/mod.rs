//! Fire-safety inspection scheduling and lifecycle.
//!
//! Inspectors are matched to time slots, approved applications surface as pending
//! inspections, missed slots expire on read, and inspection outcomes are reflected back to
//! the owner through notifications.

pub mod availability;
pub mod clock;
pub mod domain;
pub(crate) mod locks;
pub mod memory;
pub mod repository;
pub mod retry;
pub mod router;
pub mod schedule;
pub mod scheduler;
pub mod sweeper;
pub mod synchronizer;

#[cfg(test)]
mod tests;

pub use availability::{EligibleInspectors, Ineligibility};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, DutyStatus, Establishment,
    EstablishmentId, EstablishmentStatus, Inspection, InspectionEvent, InspectionId,
    InspectionStatus, InspectionType, Inspector, InspectorId, RejectionDetails, RejectionEntry,
    UserRole, ValidationError,
};
pub use memory::{InMemoryNotificationPublisher, InMemorySchedulingStore, LoggingNotificationPublisher};
pub use repository::{
    InspectionFilter, Notice, NotificationError, NotificationPublisher, RepositoryError,
    SchedulingRepository,
};
pub use retry::RetryPolicy;
pub use router::inspection_router;
pub use schedule::{ScheduleRequest, ScheduleWindow};
pub use scheduler::{InspectionScheduler, SchedulingError};
pub use synchronizer::StatusSynchronizer;
