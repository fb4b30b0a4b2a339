//! In-process store used by the demo server and the test suites.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Establishment, EstablishmentId, Inspection,
    InspectionEvent, InspectionId, Inspector, RejectionEntry,
};
use super::repository::{
    ApplicationStore, EstablishmentStore, HistoryLog, InspectionFilter, InspectionStore,
    InspectorRoster, NotificationError, NotificationPublisher, Notice, RepositoryError,
};

#[derive(Debug, Default)]
pub struct InMemorySchedulingStore {
    inspections: RwLock<BTreeMap<InspectionId, Inspection>>,
    applications: RwLock<BTreeMap<ApplicationId, Application>>,
    establishments: RwLock<BTreeMap<EstablishmentId, Establishment>>,
    inspectors: RwLock<Vec<Inspector>>,
    rejections: RwLock<HashMap<EstablishmentId, Vec<RejectionEntry>>>,
    events: RwLock<Vec<InspectionEvent>>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inspector(mut self, inspector: Inspector) -> Self {
        self.inspectors.get_mut().push(inspector);
        self
    }

    pub fn with_establishment(mut self, establishment: Establishment) -> Self {
        self.establishments
            .get_mut()
            .insert(establishment.id.clone(), establishment);
        self
    }

    pub fn with_application(mut self, application: Application) -> Self {
        self.applications
            .get_mut()
            .insert(application.id.clone(), application);
        self
    }

    pub fn with_inspection(mut self, inspection: Inspection) -> Self {
        self.inspections
            .get_mut()
            .insert(inspection.id.clone(), inspection);
        self
    }

    /// Number of persisted inspection rows, virtual ones excluded.
    pub async fn persisted_inspections(&self) -> usize {
        self.inspections.read().await.len()
    }
}

#[async_trait]
impl InspectionStore for InMemorySchedulingStore {
    async fn fetch_inspection(
        &self,
        id: &InspectionId,
    ) -> Result<Option<Inspection>, RepositoryError> {
        Ok(self.inspections.read().await.get(id).cloned())
    }

    async fn list_inspections(
        &self,
        filter: &InspectionFilter,
    ) -> Result<Vec<Inspection>, RepositoryError> {
        Ok(self
            .inspections
            .read()
            .await
            .values()
            .filter(|inspection| filter.matches(inspection))
            .cloned()
            .collect())
    }

    async fn upsert_inspection(&self, inspection: Inspection) -> Result<Inspection, RepositoryError> {
        self.inspections
            .write()
            .await
            .insert(inspection.id.clone(), inspection.clone());
        Ok(inspection)
    }

    async fn upsert_inspections(&self, inspections: Vec<Inspection>) -> Result<(), RepositoryError> {
        let mut guard = self.inspections.write().await;
        for inspection in inspections {
            guard.insert(inspection.id.clone(), inspection);
        }
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for InMemorySchedulingStore {
    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.applications.read().await.get(id).cloned())
    }

    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .applications
            .read()
            .await
            .values()
            .filter(|application| status.map_or(true, |wanted| application.status == wanted))
            .cloned()
            .collect())
    }

    async fn upsert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.applications
            .write()
            .await
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }
}

#[async_trait]
impl EstablishmentStore for InMemorySchedulingStore {
    async fn fetch_establishment(
        &self,
        id: &EstablishmentId,
    ) -> Result<Option<Establishment>, RepositoryError> {
        Ok(self.establishments.read().await.get(id).cloned())
    }

    async fn upsert_establishment(
        &self,
        establishment: Establishment,
    ) -> Result<Establishment, RepositoryError> {
        self.establishments
            .write()
            .await
            .insert(establishment.id.clone(), establishment.clone());
        Ok(establishment)
    }
}

#[async_trait]
impl InspectorRoster for InMemorySchedulingStore {
    async fn list_inspectors(&self) -> Result<Vec<Inspector>, RepositoryError> {
        Ok(self.inspectors.read().await.clone())
    }
}

#[async_trait]
impl HistoryLog for InMemorySchedulingStore {
    async fn append_rejection(
        &self,
        establishment_id: &EstablishmentId,
        entry: RejectionEntry,
    ) -> Result<(), RepositoryError> {
        if !self.establishments.read().await.contains_key(establishment_id) {
            return Err(RepositoryError::NotFound {
                entity: "establishment",
                id: establishment_id.to_string(),
            });
        }
        self.rejections
            .write()
            .await
            .entry(establishment_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn rejection_history(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Vec<RejectionEntry>, RepositoryError> {
        Ok(self
            .rejections
            .read()
            .await
            .get(establishment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_event(&self, event: InspectionEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn inspection_history(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionEvent>, RepositoryError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| &event.inspection_id == inspection_id)
            .cloned()
            .collect())
    }
}

/// Keeps every notice in memory so callers can inspect what would have been sent.
#[derive(Debug, Default)]
pub struct InMemoryNotificationPublisher {
    notices: RwLock<Vec<Notice>>,
}

impl InMemoryNotificationPublisher {
    pub async fn notices(&self) -> Vec<Notice> {
        self.notices.read().await.clone()
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryNotificationPublisher {
    async fn publish(&self, notice: Notice) -> Result<(), NotificationError> {
        self.notices.write().await.push(notice);
        Ok(())
    }
}

/// Writes notices to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationPublisher;

#[async_trait]
impl NotificationPublisher for LoggingNotificationPublisher {
    async fn publish(&self, notice: Notice) -> Result<(), NotificationError> {
        info!(
            template = %notice.template,
            recipient = %notice.recipient,
            inspection_id = %notice.inspection_id,
            "notification dispatched"
        );
        Ok(())
    }
}
