use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::availability::{self, EligibleInspectors, Ineligibility};
use super::clock::{Clock, SystemClock};
use super::domain::{
    Inspection, InspectionEvent, InspectionId, InspectionStatus, InspectorId, RejectionDetails,
    ValidationError,
};
use super::locks::ScheduleLocks;
use super::repository::{
    InspectionFilter, Notice, NotificationPublisher, RepositoryError, SchedulingRepository,
};
use super::retry::RetryPolicy;
use super::schedule::{ScheduleRequest, ScheduleWindow};
use super::sweeper;
use super::synchronizer::{clean_reasons, StatusSynchronizer};

/// Owns the inspection state machine.
///
/// Every operation resolves the inspection (persisted or virtual), checks the transition,
/// and commits the whole row in a single upsert. Validation and conflict failures return
/// before anything is written.
pub struct InspectionScheduler<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    locks: ScheduleLocks,
    synchronizer: StatusSynchronizer<R>,
}

impl<R, N> InspectionScheduler<R, N>
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>) -> Self {
        Self::with_parts(
            repository,
            notifications,
            Arc::new(SystemClock),
            RetryPolicy::default(),
        )
    }

    pub fn with_parts(
        repository: Arc<R>,
        notifications: Arc<N>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        let synchronizer =
            StatusSynchronizer::new(Arc::clone(&repository), Arc::clone(&clock), retry);
        Self {
            repository,
            notifications,
            clock,
            retry,
            locks: ScheduleLocks::default(),
            synchronizer,
        }
    }

    pub fn synchronizer(&self) -> &StatusSynchronizer<R> {
        &self.synchronizer
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// The working set: persisted rows plus virtual ones, with overdue slots expired.
    pub async fn inspections(
        &self,
        filter: &InspectionFilter,
    ) -> Result<Vec<Inspection>, SchedulingError> {
        let everything = InspectionFilter::default();
        let persisted = self
            .retry
            .run("list_inspections", || {
                self.repository.list_inspections(&everything)
            })
            .await?;
        let virtuals = self.synchronizer.virtual_inspections(&persisted).await?;

        let outcome = sweeper::sweep(persisted, self.clock.today());
        self.persist_expired(&outcome.expired).await?;

        let mut working = outcome.inspections;
        working.extend(virtuals);
        working.retain(|inspection| filter.matches(inspection));
        Ok(working)
    }

    pub async fn inspection(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Inspection, SchedulingError> {
        self.resolve(inspection_id).await
    }

    pub async fn inspection_history(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionEvent>, SchedulingError> {
        self.resolve(inspection_id).await?;
        self.synchronizer.inspection_history(inspection_id).await
    }

    pub async fn schedule_and_assign(
        &self,
        inspection_id: &InspectionId,
        request: ScheduleRequest,
    ) -> Result<Inspection, SchedulingError> {
        self.schedule_and_assign_until(inspection_id, request, &CancellationToken::new())
            .await
    }

    /// Validates the slot, reserves it on the inspector's calendar, and commits.
    ///
    /// Cancellation is honoured up to the commit; once the write starts it runs to
    /// completion so the row is never left half-assigned.
    pub async fn schedule_and_assign_until(
        &self,
        inspection_id: &InspectionId,
        request: ScheduleRequest,
        cancel: &CancellationToken,
    ) -> Result<Inspection, SchedulingError> {
        let (inspector_id, window) = request.validate(self.clock.today())?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SchedulingError::Cancelled),
            known = self.ensure_rostered(&inspector_id) => known?,
        };

        let _calendar = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SchedulingError::Cancelled),
            guard = self.locks.acquire(&inspector_id) => guard,
        };

        let (from, candidate) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SchedulingError::Cancelled),
            prepared = self.prepare_assignment(inspection_id, &inspector_id, window) => prepared?,
        };

        if cancel.is_cancelled() {
            return Err(SchedulingError::Cancelled);
        }

        let detail = format!(
            "assigned to {} for {} - {}",
            inspector_id,
            window.start().format("%Y-%m-%d %H:%M"),
            window.end().format("%H:%M")
        );
        let stored = self.commit(candidate, from, Some(detail)).await?;

        let mut details = BTreeMap::new();
        details.insert(
            "establishment".to_string(),
            stored.establishment_name.clone(),
        );
        details.insert("scheduled_start".to_string(), window.start().to_rfc3339());
        details.insert("scheduled_end".to_string(), window.end().to_rfc3339());
        self.notify(Notice {
            template: "inspection_assigned".to_string(),
            recipient: inspector_id.to_string(),
            inspection_id: stored.id.clone(),
            details,
        });

        Ok(stored)
    }

    /// Unknown ids are turned away before they get a lock entry.
    async fn ensure_rostered(&self, inspector_id: &InspectorId) -> Result<(), SchedulingError> {
        let roster = self
            .retry
            .run("list_inspectors", || self.repository.list_inspectors())
            .await?;
        if roster.iter().any(|inspector| &inspector.id == inspector_id) {
            Ok(())
        } else {
            Err(SchedulingError::not_found("inspector", inspector_id))
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_calendars(&self) -> usize {
        self.locks.tracked()
    }

    async fn prepare_assignment(
        &self,
        inspection_id: &InspectionId,
        inspector_id: &InspectorId,
        window: ScheduleWindow,
    ) -> Result<(InspectionStatus, Inspection), SchedulingError> {
        let mut inspection = self.resolve(inspection_id).await?;
        ensure_transition(&inspection, InspectionStatus::Scheduled)?;

        let roster = self
            .retry
            .run("list_inspectors", || self.repository.list_inspectors())
            .await?;
        let calendar_filter = InspectionFilter::for_inspector(inspector_id);
        let calendar = self
            .retry
            .run("list_inspections", || {
                self.repository.list_inspections(&calendar_filter)
            })
            .await?;

        let inspector = availability::check(
            inspector_id,
            &window,
            &roster,
            &calendar,
            Some(&inspection.id),
        )
        .map_err(|reason| match reason {
            Ineligibility::UnknownInspector(id) => SchedulingError::not_found("inspector", id),
            reason => {
                warn!(
                    inspection_id = %inspection.id,
                    %inspector_id,
                    %reason,
                    "scheduling conflict"
                );
                SchedulingError::Conflict {
                    inspector_id: inspector_id.clone(),
                    reason,
                }
            }
        })?;

        let from = inspection.status;
        inspection.status = InspectionStatus::Scheduled;
        inspection.inspector_id = Some(inspector.id.clone());
        inspection.inspector_name = Some(inspector.name.clone());
        inspection.schedule = Some(window);
        Ok((from, inspection))
    }

    /// Returns a scheduled inspection to the unassigned pool.
    pub async fn clear_schedule(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Inspection, SchedulingError> {
        let mut inspection = self.resolve(inspection_id).await?;
        if inspection.status == InspectionStatus::Pending {
            return Ok(inspection);
        }
        ensure_transition(&inspection, InspectionStatus::Pending)?;

        let from = inspection.status;
        inspection.status = InspectionStatus::Pending;
        inspection.clear_assignment();
        self.commit(inspection, from, Some("schedule cleared".to_string()))
            .await
    }

    /// The inspector has visited and submitted the checklist.
    pub async fn complete_inspection(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Inspection, SchedulingError> {
        let mut inspection = self.resolve(inspection_id).await?;
        ensure_transition(&inspection, InspectionStatus::Inspected)?;

        let from = inspection.status;
        inspection.status = InspectionStatus::Inspected;
        self.commit(inspection, from, None).await
    }

    /// Records a failed inspection. Establishment and application state are left alone.
    pub async fn reject(
        &self,
        inspection_id: &InspectionId,
        reasons: Vec<String>,
        notes: impl Into<String>,
    ) -> Result<Inspection, SchedulingError> {
        let reasons = clean_reasons(reasons)?;
        let mut inspection = self.resolve(inspection_id).await?;
        ensure_transition(&inspection, InspectionStatus::Rejected)?;

        let from = inspection.status;
        inspection.status = InspectionStatus::Rejected;
        inspection.rejection = Some(RejectionDetails {
            reasons,
            notes: notes.into(),
        });
        let detail = inspection.rejection_reason();
        let stored = self.commit(inspection, from, detail).await?;
        self.notify_outcome(&stored);
        Ok(stored)
    }

    /// Approves an inspected establishment. Approving again with the same certificate is a
    /// no-op that returns the stored row.
    pub async fn approve(
        &self,
        inspection_id: &InspectionId,
        certificate_url: impl Into<String>,
    ) -> Result<Inspection, SchedulingError> {
        let certificate_url = certificate_url.into().trim().to_string();
        if certificate_url.is_empty() {
            return Err(ValidationError::MissingCertificateUrl.into());
        }

        let mut inspection = self.resolve(inspection_id).await?;
        if inspection.status == InspectionStatus::Approved
            && inspection.certificate_url.as_deref() == Some(certificate_url.as_str())
        {
            debug!(inspection_id = %inspection.id, "inspection already approved");
            return Ok(inspection);
        }
        ensure_transition(&inspection, InspectionStatus::Approved)?;

        let from = inspection.status;
        inspection.status = InspectionStatus::Approved;
        inspection.certificate_url = Some(certificate_url);
        let stored = self.commit(inspection, from, None).await?;
        self.notify_outcome(&stored);
        Ok(stored)
    }

    /// Reopens a rejected inspection so it can be scheduled again.
    pub async fn request_reinspection(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Inspection, SchedulingError> {
        let mut inspection = self.resolve(inspection_id).await?;
        ensure_transition(&inspection, InspectionStatus::Pending)?;

        let from = inspection.status;
        let detail = inspection
            .rejection_reason()
            .map(|reason| format!("re-inspection requested after: {reason}"));
        inspection.status = InspectionStatus::Pending;
        inspection.clear_assignment();
        inspection.rejection = None;
        self.commit(inspection, from, detail).await
    }

    /// Inspectors who could take the slot, or an explicit "nobody".
    pub async fn eligible_inspectors(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<EligibleInspectors, SchedulingError> {
        let window = ScheduleWindow::on(date, start_time, end_time)?;
        let today = self.clock.today();
        if date < today {
            return Err(ValidationError::PastDate { date, today }.into());
        }

        let roster = self
            .retry
            .run("list_inspectors", || self.repository.list_inspectors())
            .await?;
        let everything = InspectionFilter::default();
        let existing = self
            .retry
            .run("list_inspections", || {
                self.repository.list_inspections(&everything)
            })
            .await?;

        Ok(availability::eligible_inspectors(
            &window, &roster, &existing,
        ))
    }

    async fn resolve(&self, inspection_id: &InspectionId) -> Result<Inspection, SchedulingError> {
        let persisted = self
            .retry
            .run("fetch_inspection", || {
                self.repository.fetch_inspection(inspection_id)
            })
            .await?;

        match persisted {
            Some(inspection) => {
                let outcome = sweeper::sweep(vec![inspection], self.clock.today());
                self.persist_expired(&outcome.expired).await?;
                outcome
                    .inspections
                    .into_iter()
                    .next()
                    .ok_or_else(|| SchedulingError::not_found("inspection", inspection_id))
            }
            None => self
                .synchronizer
                .resolve_virtual(inspection_id)
                .await?
                .ok_or_else(|| SchedulingError::not_found("inspection", inspection_id)),
        }
    }

    async fn persist_expired(&self, expired: &[Inspection]) -> Result<(), SchedulingError> {
        if expired.is_empty() {
            return Ok(());
        }

        self.retry
            .run("upsert_inspections", || {
                self.repository.upsert_inspections(expired.to_vec())
            })
            .await?;
        for inspection in expired {
            self.synchronizer
                .record_transition(
                    inspection,
                    InspectionStatus::Scheduled,
                    Some("scheduled day passed without an inspection".to_string()),
                )
                .await;
        }
        info!(count = expired.len(), "expired overdue inspections");
        Ok(())
    }

    async fn commit(
        &self,
        inspection: Inspection,
        from: InspectionStatus,
        detail: Option<String>,
    ) -> Result<Inspection, SchedulingError> {
        let stored = self
            .retry
            .run("upsert_inspection", || {
                self.repository.upsert_inspection(inspection.clone())
            })
            .await?;
        self.synchronizer
            .record_transition(&stored, from, detail)
            .await;
        info!(
            inspection_id = %stored.id,
            from = from.label(),
            to = stored.status.label(),
            "inspection status changed"
        );
        Ok(stored)
    }

    fn notify_outcome(&self, inspection: &Inspection) {
        if let Some(notice) = StatusSynchronizer::<R>::outcome_notice(inspection) {
            self.notify(notice);
        }
    }

    /// Fire-and-forget; delivery failures are logged, never returned.
    fn notify(&self, notice: Notice) {
        let publisher = Arc::clone(&self.notifications);
        tokio::spawn(async move {
            let template = notice.template.clone();
            if let Err(err) = publisher.publish(notice).await {
                warn!(%template, %err, "notification delivery failed");
            }
        });
    }
}

fn ensure_transition(inspection: &Inspection, to: InspectionStatus) -> Result<(), SchedulingError> {
    if inspection.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(SchedulingError::InvalidTransition {
            entity: "inspection",
            id: inspection.id.to_string(),
            from: inspection.status.label(),
            to: to.label(),
        })
    }
}

/// Error raised by the scheduling service.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("inspector {inspector_id} cannot take this slot: {reason}")]
    Conflict {
        inspector_id: InspectorId,
        reason: Ineligibility,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("store error: {0}")]
    Persistence(RepositoryError),
    #[error("scheduling request cancelled before commit")]
    Cancelled,
}

impl From<RepositoryError> for SchedulingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            err => Self::Persistence(err),
        }
    }
}

impl SchedulingError {
    pub(crate) fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
