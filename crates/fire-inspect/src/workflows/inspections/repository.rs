use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Establishment, EstablishmentId, Inspection,
    InspectionEvent, InspectionId, InspectionStatus, Inspector, InspectorId, RejectionEntry,
};

/// Equality and range constraints over inspection rows. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionFilter {
    pub status: Option<InspectionStatus>,
    pub inspector_id: Option<InspectorId>,
    pub establishment_id: Option<EstablishmentId>,
    pub application_id: Option<ApplicationId>,
    /// Inclusive lower bound on `scheduled_start`.
    pub starts_from: Option<DateTime<FixedOffset>>,
    /// Exclusive upper bound on `scheduled_start`.
    pub starts_before: Option<DateTime<FixedOffset>>,
}

impl InspectionFilter {
    pub fn for_inspector(inspector_id: &InspectorId) -> Self {
        Self {
            inspector_id: Some(inspector_id.clone()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: InspectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, inspection: &Inspection) -> bool {
        if self.status.is_some_and(|status| status != inspection.status) {
            return false;
        }
        if let Some(inspector_id) = &self.inspector_id {
            if inspection.inspector_id.as_ref() != Some(inspector_id) {
                return false;
            }
        }
        if let Some(establishment_id) = &self.establishment_id {
            if &inspection.establishment_id != establishment_id {
                return false;
            }
        }
        if let Some(application_id) = &self.application_id {
            if &inspection.application_id != application_id {
                return false;
            }
        }
        if self.starts_from.is_some() || self.starts_before.is_some() {
            let Some(start) = inspection.schedule.map(|window| window.start()) else {
                return false;
            };
            if self.starts_from.is_some_and(|from| start < from) {
                return false;
            }
            if self.starts_before.is_some_and(|before| start >= before) {
                return false;
            }
        }
        true
    }
}

/// Durable inspection rows keyed by id.
#[async_trait]
pub trait InspectionStore: Send + Sync {
    async fn fetch_inspection(&self, id: &InspectionId)
        -> Result<Option<Inspection>, RepositoryError>;
    async fn list_inspections(
        &self,
        filter: &InspectionFilter,
    ) -> Result<Vec<Inspection>, RepositoryError>;
    /// Insert or replace the row with the same id.
    async fn upsert_inspection(&self, inspection: Inspection) -> Result<Inspection, RepositoryError>;
    /// All rows land or none do.
    async fn upsert_inspections(&self, inspections: Vec<Inspection>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;
    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, RepositoryError>;
    async fn upsert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError>;
}

#[async_trait]
pub trait EstablishmentStore: Send + Sync {
    async fn fetch_establishment(
        &self,
        id: &EstablishmentId,
    ) -> Result<Option<Establishment>, RepositoryError>;
    async fn upsert_establishment(
        &self,
        establishment: Establishment,
    ) -> Result<Establishment, RepositoryError>;
}

/// Inspector profiles as maintained by user administration.
#[async_trait]
pub trait InspectorRoster: Send + Sync {
    async fn list_inspectors(&self) -> Result<Vec<Inspector>, RepositoryError>;
}

/// Append-only logs: establishment rejections and inspection transitions.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append_rejection(
        &self,
        establishment_id: &EstablishmentId,
        entry: RejectionEntry,
    ) -> Result<(), RepositoryError>;
    async fn rejection_history(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Vec<RejectionEntry>, RepositoryError>;
    async fn append_event(&self, event: InspectionEvent) -> Result<(), RepositoryError>;
    async fn inspection_history(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionEvent>, RepositoryError>;
}

/// Everything the scheduling service needs from persistence.
pub trait SchedulingRepository:
    InspectionStore + ApplicationStore + EstablishmentStore + InspectorRoster + HistoryLog
{
}

impl<T> SchedulingRepository for T where
    T: InspectionStore + ApplicationStore + EstablishmentStore + InspectorRoster + HistoryLog
{
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// A write referenced a parent record the store does not hold.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Failures worth retrying; everything else is returned to the caller as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

/// Outbound alert hook (SMS, e-mail, push). Delivery is never awaited by the scheduler.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, notice: Notice) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub template: String,
    pub recipient: String,
    pub inspection_id: InspectionId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
