use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use super::clock::Clock;
use super::domain::{
    Application, ApplicationId, ApplicationStatus, Establishment, EstablishmentId,
    EstablishmentStatus, Inspection, InspectionEvent, InspectionId, InspectionStatus,
    RejectionEntry, ValidationError,
};
use super::repository::{InspectionFilter, Notice, SchedulingRepository};
use super::retry::RetryPolicy;
use super::scheduler::SchedulingError;

/// Keeps inspections, applications, and establishments consistent with one another.
///
/// Approved FSIC applications surface as pending inspections whose identity is derived from
/// the application id, so the same application resolves to the same inspection on every
/// read whether or not the row has been written yet.
pub struct StatusSynchronizer<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<R> StatusSynchronizer<R>
where
    R: SchedulingRepository + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            repository,
            clock,
            retry,
        }
    }

    /// The inspection an approved FSIC application gives rise to.
    pub fn synthesize(application: &Application, establishment_name: &str) -> Option<Inspection> {
        if application.status != ApplicationStatus::Approved {
            return None;
        }
        let inspection_type = application.application_type.inspection_type()?;
        Some(Inspection::pending_for(
            application,
            inspection_type,
            establishment_name,
        ))
    }

    /// Pending inspections for approved applications that have no persisted row yet.
    pub async fn virtual_inspections(
        &self,
        persisted: &[Inspection],
    ) -> Result<Vec<Inspection>, SchedulingError> {
        let materialized: HashSet<&ApplicationId> = persisted
            .iter()
            .map(|inspection| &inspection.application_id)
            .collect();

        let mut virtuals = Vec::new();
        for application in self.approved_applications().await? {
            if materialized.contains(&application.id)
                || application.application_type.inspection_type().is_none()
            {
                continue;
            }
            let name = self.establishment_name(&application.establishment_id).await?;
            virtuals.extend(Self::synthesize(&application, &name));
        }
        Ok(virtuals)
    }

    /// Finds the not-yet-persisted inspection carrying `inspection_id`, if any.
    pub async fn resolve_virtual(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Option<Inspection>, SchedulingError> {
        let Some(application) = self
            .approved_applications()
            .await?
            .into_iter()
            .find(|application| &InspectionId::for_application(&application.id) == inspection_id)
        else {
            return Ok(None);
        };

        let filter = InspectionFilter {
            application_id: Some(application.id.clone()),
            ..InspectionFilter::default()
        };
        let existing = self
            .retry
            .run("list_inspections", || self.repository.list_inspections(&filter))
            .await?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let name = self.establishment_name(&application.establishment_id).await?;
        Ok(Self::synthesize(&application, &name))
    }

    /// The inspection for `application_id`: the persisted row when there is one, otherwise
    /// the virtual pending inspection with its derived identity.
    pub async fn get_or_create(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Inspection, SchedulingError> {
        let filter = InspectionFilter {
            application_id: Some(application_id.clone()),
            ..InspectionFilter::default()
        };
        let existing = self
            .retry
            .run("list_inspections", || self.repository.list_inspections(&filter))
            .await?;
        if let Some(inspection) = existing.into_iter().next() {
            return Ok(inspection);
        }

        let application = self.fetch_application(application_id).await?;
        let name = self.establishment_name(&application.establishment_id).await?;
        Self::synthesize(&application, &name).ok_or_else(|| {
            SchedulingError::not_found("inspection for application", application_id)
        })
    }

    /// Approves a pending application; FSIC approvals expose their pending inspection.
    pub async fn approve_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(Application, Option<Inspection>), SchedulingError> {
        let mut application = self.fetch_application(application_id).await?;
        match application.status {
            ApplicationStatus::Approved => {}
            ApplicationStatus::Pending => {
                application.status = ApplicationStatus::Approved;
                let stored = self
                    .retry
                    .run("upsert_application", || {
                        self.repository.upsert_application(application.clone())
                    })
                    .await?;
                application = stored;
                info!(application_id = %application.id, "application approved");
            }
            ApplicationStatus::Rejected => {
                return Err(SchedulingError::InvalidTransition {
                    entity: "application",
                    id: application.id.to_string(),
                    from: application.status.label(),
                    to: ApplicationStatus::Approved.label(),
                });
            }
        }

        let inspection = match application.application_type.inspection_type() {
            Some(_) => Some(self.get_or_create(&application.id).await?),
            None => None,
        };
        Ok((application, inspection))
    }

    pub async fn reject_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Application, SchedulingError> {
        let mut application = self.fetch_application(application_id).await?;
        match application.status {
            ApplicationStatus::Rejected => Ok(application),
            ApplicationStatus::Pending => {
                application.status = ApplicationStatus::Rejected;
                let stored = self
                    .retry
                    .run("upsert_application", || {
                        self.repository.upsert_application(application.clone())
                    })
                    .await?;
                info!(application_id = %stored.id, "application rejected");
                Ok(stored)
            }
            ApplicationStatus::Approved => Err(SchedulingError::InvalidTransition {
                entity: "application",
                id: application.id.to_string(),
                from: application.status.label(),
                to: ApplicationStatus::Rejected.label(),
            }),
        }
    }

    /// Owner submits the establishment for admin review.
    pub async fn pre_register(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Establishment, SchedulingError> {
        let establishment = self.fetch_establishment(establishment_id).await?;
        match establishment.status {
            EstablishmentStatus::PreRegistered => Ok(establishment),
            EstablishmentStatus::Unregistered => {
                self.move_establishment(establishment, EstablishmentStatus::PreRegistered)
                    .await
            }
            EstablishmentStatus::Registered => Err(establishment_transition(
                &establishment,
                EstablishmentStatus::PreRegistered,
            )),
        }
    }

    pub async fn approve_establishment(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Establishment, SchedulingError> {
        let establishment = self.fetch_establishment(establishment_id).await?;
        match establishment.status {
            EstablishmentStatus::Registered => Ok(establishment),
            EstablishmentStatus::PreRegistered => {
                self.move_establishment(establishment, EstablishmentStatus::Registered)
                    .await
            }
            EstablishmentStatus::Unregistered => Err(establishment_transition(
                &establishment,
                EstablishmentStatus::Registered,
            )),
        }
    }

    /// Appends the reasons to the rejection history, then sends the pre-registered
    /// establishment back to `unregistered`.
    pub async fn reject_establishment(
        &self,
        establishment_id: &EstablishmentId,
        reasons: Vec<String>,
        notes: String,
    ) -> Result<Establishment, SchedulingError> {
        let reasons = clean_reasons(reasons)?;
        let establishment = self.fetch_establishment(establishment_id).await?;
        if establishment.status != EstablishmentStatus::PreRegistered {
            return Err(establishment_transition(
                &establishment,
                EstablishmentStatus::Unregistered,
            ));
        }

        // Entry before status: a failed write leaves the establishment pre-registered.
        let entry = RejectionEntry {
            reasons,
            notes,
            timestamp: self.clock.now(),
        };
        self.retry
            .run("append_rejection", || {
                self.repository
                    .append_rejection(&establishment.id, entry.clone())
            })
            .await?;
        self.move_establishment(establishment, EstablishmentStatus::Unregistered)
            .await
    }

    pub async fn rejection_history(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Vec<RejectionEntry>, SchedulingError> {
        self.fetch_establishment(establishment_id).await?;
        Ok(self
            .retry
            .run("rejection_history", || {
                self.repository.rejection_history(establishment_id)
            })
            .await?)
    }

    /// Appends an audit event for a committed transition. The row is already written, so a
    /// failed append is logged rather than returned.
    pub async fn record_transition(
        &self,
        inspection: &Inspection,
        from: InspectionStatus,
        detail: Option<String>,
    ) {
        let event = InspectionEvent {
            inspection_id: inspection.id.clone(),
            from,
            to: inspection.status,
            at: self.clock.now(),
            detail,
        };
        if let Err(err) = self
            .retry
            .run("append_event", || self.repository.append_event(event.clone()))
            .await
        {
            warn!(inspection_id = %inspection.id, %err, "failed to record inspection history");
        }
    }

    pub async fn inspection_history(
        &self,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionEvent>, SchedulingError> {
        Ok(self
            .retry
            .run("inspection_history", || {
                self.repository.inspection_history(inspection_id)
            })
            .await?)
    }

    /// Owner-facing notice for a settled inspection.
    pub fn outcome_notice(inspection: &Inspection) -> Option<Notice> {
        let mut details = BTreeMap::new();
        details.insert(
            "establishment".to_string(),
            inspection.establishment_name.clone(),
        );
        let template = match inspection.status {
            InspectionStatus::Approved => {
                if let Some(url) = &inspection.certificate_url {
                    details.insert("certificate_url".to_string(), url.clone());
                }
                "inspection_approved"
            }
            InspectionStatus::Rejected => {
                if let Some(reason) = inspection.rejection_reason() {
                    details.insert("reasons".to_string(), reason);
                }
                "reinspection_required"
            }
            _ => return None,
        };

        Some(Notice {
            template: template.to_string(),
            recipient: inspection.establishment_id.to_string(),
            inspection_id: inspection.id.clone(),
            details,
        })
    }

    async fn approved_applications(&self) -> Result<Vec<Application>, SchedulingError> {
        Ok(self
            .retry
            .run("list_applications", || {
                self.repository
                    .list_applications(Some(ApplicationStatus::Approved))
            })
            .await?)
    }

    async fn fetch_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Application, SchedulingError> {
        self.retry
            .run("fetch_application", || {
                self.repository.fetch_application(application_id)
            })
            .await?
            .ok_or_else(|| SchedulingError::not_found("application", application_id))
    }

    async fn fetch_establishment(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<Establishment, SchedulingError> {
        self.retry
            .run("fetch_establishment", || {
                self.repository.fetch_establishment(establishment_id)
            })
            .await?
            .ok_or_else(|| SchedulingError::not_found("establishment", establishment_id))
    }

    async fn establishment_name(
        &self,
        establishment_id: &EstablishmentId,
    ) -> Result<String, SchedulingError> {
        let establishment = self
            .retry
            .run("fetch_establishment", || {
                self.repository.fetch_establishment(establishment_id)
            })
            .await?;
        Ok(match establishment {
            Some(establishment) => establishment.name,
            None => {
                warn!(%establishment_id, "approved application references a missing establishment");
                establishment_id.to_string()
            }
        })
    }

    async fn move_establishment(
        &self,
        mut establishment: Establishment,
        to: EstablishmentStatus,
    ) -> Result<Establishment, SchedulingError> {
        let from = establishment.status;
        establishment.status = to;
        if to == EstablishmentStatus::Registered {
            establishment.registered_at = Some(self.clock.now());
        }
        let stored = self
            .retry
            .run("upsert_establishment", || {
                self.repository.upsert_establishment(establishment.clone())
            })
            .await?;
        info!(
            establishment_id = %stored.id,
            from = from.label(),
            to = to.label(),
            "establishment status changed"
        );
        Ok(stored)
    }
}

fn establishment_transition(establishment: &Establishment, to: EstablishmentStatus) -> SchedulingError {
    SchedulingError::InvalidTransition {
        entity: "establishment",
        id: establishment.id.to_string(),
        from: establishment.status.label(),
        to: to.label(),
    }
}

/// Trims reasons and drops blanks; at least one must remain.
pub(crate) fn clean_reasons(reasons: Vec<String>) -> Result<Vec<String>, ValidationError> {
    let cleaned: Vec<String> = reasons
        .into_iter()
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .collect();
    if cleaned.is_empty() {
        Err(ValidationError::MissingReasons)
    } else {
        Ok(cleaned)
    }
}
