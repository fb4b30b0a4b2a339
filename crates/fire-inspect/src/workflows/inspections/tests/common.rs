use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::workflows::inspections::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, DutyStatus, Establishment,
    EstablishmentId, EstablishmentStatus, Inspection, InspectionEvent, InspectionId,
    InspectionStatus, InspectionType, Inspector, InspectorId, RejectionEntry, UserRole,
};
use crate::workflows::inspections::repository::{
    ApplicationStore, EstablishmentStore, HistoryLog, InspectionFilter, InspectionStore,
    InspectorRoster, Notice, NotificationError, NotificationPublisher, RepositoryError,
};
use crate::workflows::inspections::{
    FixedClock, InMemoryNotificationPublisher, InMemorySchedulingStore, InspectionScheduler,
    RetryPolicy, ScheduleRequest, ScheduleWindow,
};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub(super) fn today() -> NaiveDate {
    date(2025, 1, 1)
}

pub(super) fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
}

pub(super) fn inspector(id: &str, name: &str) -> Inspector {
    Inspector {
        id: InspectorId::new(id),
        name: name.to_string(),
        role: UserRole::Inspector,
        duty_status: DutyStatus::OnDuty,
        availability_start: Some(date(2025, 1, 1)),
        availability_end: Some(date(2025, 1, 31)),
    }
}

pub(super) fn establishment(id: &str, name: &str, status: EstablishmentStatus) -> Establishment {
    Establishment {
        id: EstablishmentId::new(id),
        owner_id: "owner-1".to_string(),
        name: name.to_string(),
        status,
        registered_at: None,
    }
}

pub(super) fn application(
    id: &str,
    establishment_id: &str,
    application_type: ApplicationType,
    status: ApplicationStatus,
) -> Application {
    Application {
        id: ApplicationId::new(id),
        establishment_id: EstablishmentId::new(establishment_id),
        application_type,
        status,
    }
}

pub(super) fn pending_inspection(id: &str) -> Inspection {
    Inspection {
        id: InspectionId::new(id),
        establishment_id: EstablishmentId::new("est-1"),
        establishment_name: "Harbor View Bakery".to_string(),
        inspector_id: None,
        inspector_name: None,
        inspection_type: InspectionType::FsicBusiness,
        status: InspectionStatus::Pending,
        schedule: None,
        application_id: ApplicationId::new(format!("app-{id}")),
        rejection: None,
        certificate_url: None,
    }
}

pub(super) fn booked_inspection(
    id: &str,
    inspector_id: &str,
    status: InspectionStatus,
    day: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Inspection {
    Inspection {
        inspector_id: Some(InspectorId::new(inspector_id)),
        inspector_name: Some("Inspector".to_string()),
        status,
        schedule: Some(ScheduleWindow::on(day, start, end).expect("valid window")),
        ..pending_inspection(id)
    }
}

pub(super) fn request(day: NaiveDate, start: NaiveTime, end: NaiveTime, inspector: &str) -> ScheduleRequest {
    ScheduleRequest::new(day, start, end, InspectorId::new(inspector))
}

/// Inspector `i-1`, establishment `est-1`, and a pending inspection `x`.
pub(super) fn seeded_store() -> InMemorySchedulingStore {
    InMemorySchedulingStore::new()
        .with_inspector(inspector("i-1", "R. Dela Cruz"))
        .with_establishment(establishment(
            "est-1",
            "Harbor View Bakery",
            EstablishmentStatus::Registered,
        ))
        .with_inspection(pending_inspection("x"))
}

pub(super) type TestScheduler<R = InMemorySchedulingStore, N = InMemoryNotificationPublisher> =
    InspectionScheduler<R, N>;

pub(super) struct Harness<R = InMemorySchedulingStore, N = InMemoryNotificationPublisher> {
    pub(super) scheduler: Arc<TestScheduler<R, N>>,
    pub(super) store: Arc<R>,
    pub(super) notices: Arc<N>,
}

pub(super) fn harness(store: InMemorySchedulingStore) -> Harness {
    harness_with(store, InMemoryNotificationPublisher::default())
}

pub(super) fn harness_with<R, N>(store: R, notices: N) -> Harness<R, N>
where
    R: crate::workflows::inspections::SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let store = Arc::new(store);
    let notices = Arc::new(notices);
    let scheduler = Arc::new(InspectionScheduler::with_parts(
        Arc::clone(&store),
        Arc::clone(&notices),
        Arc::new(FixedClock::on(today())),
        fast_retry(),
    ));
    Harness {
        scheduler,
        store,
        notices,
    }
}

/// Notices are published from a spawned task; poll until `expected` have landed.
pub(super) async fn wait_for_notices(
    publisher: &InMemoryNotificationPublisher,
    expected: usize,
) -> Vec<Notice> {
    for _ in 0..200 {
        let notices = publisher.notices().await;
        if notices.len() >= expected {
            return notices;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    publisher.notices().await
}

pub(super) async fn history(store: &InMemorySchedulingStore, id: &str) -> Vec<InspectionEvent> {
    store
        .inspection_history(&InspectionId::new(id))
        .await
        .expect("history readable")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Debug, Default)]
pub(super) struct FailingPublisher;

#[async_trait]
impl NotificationPublisher for FailingPublisher {
    async fn publish(&self, _notice: Notice) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("sms gateway down".to_string()))
    }
}

/// Delegates to an in-memory store but fails the first `failures` inspection writes.
/// The rejection log can be taken down separately.
pub(super) struct FlakyStore {
    inner: InMemorySchedulingStore,
    failures: AtomicU32,
    pub(super) write_attempts: AtomicU32,
    rejection_log_down: AtomicBool,
}

impl FlakyStore {
    pub(super) fn new(inner: InMemorySchedulingStore, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            write_attempts: AtomicU32::new(0),
            rejection_log_down: AtomicBool::new(false),
        }
    }

    pub(super) fn set_rejection_log_down(&self, down: bool) {
        self.rejection_log_down.store(down, Ordering::SeqCst);
    }

    fn trip(&self) -> Result<(), RepositoryError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InspectionStore for FlakyStore {
    async fn fetch_inspection(
        &self,
        id: &InspectionId,
    ) -> Result<Option<Inspection>, RepositoryError> {
        self.inner.fetch_inspection(id).await
    }

    async fn list_inspections(
        &self,
        filter: &InspectionFilter,
    ) -> Result<Vec<Inspection>, RepositoryError> {
        self.inner.list_inspections(filter).await
    }

    async fn upsert_inspection(&self, inspection: Inspection) -> Result<Inspection, RepositoryError> {
        self.trip()?;
        self.inner.upsert_inspection(inspection).await
    }

    async fn upsert_inspections(&self, inspections: Vec<Inspection>) -> Result<(), RepositoryError> {
        self.trip()?;
        self.inner.upsert_inspections(inspections).await
    }
}

#[async_trait]
impl ApplicationStore for FlakyStore {
    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch_application(id).await
    }

    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.list_applications(status).await
    }

    async fn upsert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.inner.upsert_application(application).await
    }
}

#[async_trait]
impl EstablishmentStore for FlakyStore {
    async fn fetch_establishment(
        &self,
        id: &EstablishmentId,
    ) -> Result<Option<Establishment>, RepositoryError> {
        self.inner.fetch_establishment(id).await
    }

    async fn upsert_establishment(
        &self,
        establishment: Establishment,
    ) -> Result<Establishment, RepositoryError> {
        self.inner.upsert_establishment(establishment).await
    }
}

#[async_trait]
impl InspectorRoster for FlakyStore {
    async fn list_inspectors(&self) -> Result<Vec<Inspector>, RepositoryError> {
        self.inner.list_inspectors().await
    }
}

#[async_trait]
impl HistoryLog for FlakyStore {
    async fn append_rejection(
        &self,
        establishment_id: &EstablishmentId,
        entry: RejectionEntry,
    ) -> Result<(), RepositoryError> {
        if self.rejection_log_down.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("rejection log down".to_string()));
        }
        self.inner.append_rejection(establishment_id, entry).await
    }

    async fn rejection_history(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Vec<RejectionEntry>, RepositoryError> {
        self.inner.rejection_history(establishment_id).await
    }

    async fn append_event(&self, event: InspectionEvent) -> Result<(), RepositoryError> {
        self.inner.append_event(event).await
    }

    async fn inspection_history(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionEvent>, RepositoryError> {
        self.inner.inspection_history(inspection_id).await
    }
}
