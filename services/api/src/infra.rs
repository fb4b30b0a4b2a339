use chrono::{Duration, NaiveDate, NaiveTime};
use fire_inspect::workflows::inspections::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, DutyStatus, Establishment,
    EstablishmentId, EstablishmentStatus, InMemorySchedulingStore, Inspection, InspectionId,
    InspectionStatus, InspectionType, Inspector, InspectorId, ScheduleWindow, UserRole,
    ValidationError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn inspector(
    id: &str,
    name: &str,
    duty_status: DutyStatus,
    availability: (Option<NaiveDate>, Option<NaiveDate>),
) -> Inspector {
    Inspector {
        id: InspectorId::new(id),
        name: name.to_string(),
        role: UserRole::Inspector,
        duty_status,
        availability_start: availability.0,
        availability_end: availability.1,
    }
}

fn establishment(id: &str, name: &str, status: EstablishmentStatus) -> Establishment {
    Establishment {
        id: EstablishmentId::new(id),
        owner_id: format!("owner-{id}"),
        name: name.to_string(),
        status,
        registered_at: None,
    }
}

fn application(
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

/// Roster, establishments, and applications shared by `serve` and `demo`.
///
/// Includes one inspection whose slot fell three days before `today` so the expiry sweep has
/// something to do on first read.
pub(crate) fn demo_store(
    today: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<InMemorySchedulingStore, ValidationError> {
    let missed_day = today - Duration::days(3);
    let missed = Inspection {
        id: InspectionId::for_application(&ApplicationId::new("app-0999")),
        establishment_id: EstablishmentId::new("est-clinic"),
        establishment_name: "Poblacion Dental Clinic".to_string(),
        inspector_id: Some(InspectorId::new("insp-santos")),
        inspector_name: Some("M. Santos".to_string()),
        inspection_type: InspectionType::FsicOccupancy,
        status: InspectionStatus::Scheduled,
        schedule: Some(ScheduleWindow::on(missed_day, start, end)?),
        application_id: ApplicationId::new("app-0999"),
        rejection: None,
        certificate_url: None,
    };

    Ok(InMemorySchedulingStore::new()
        .with_inspector(inspector(
            "insp-santos",
            "M. Santos",
            DutyStatus::OnDuty,
            (Some(today - Duration::days(30)), Some(today + Duration::days(60))),
        ))
        .with_inspector(inspector(
            "insp-reyes",
            "J. Reyes",
            DutyStatus::OnDuty,
            (None, None),
        ))
        .with_inspector(inspector(
            "insp-cruz",
            "A. Cruz",
            DutyStatus::OffDuty,
            (None, None),
        ))
        .with_establishment(establishment(
            "est-bakery",
            "Harbor View Bakery",
            EstablishmentStatus::Registered,
        ))
        .with_establishment(establishment(
            "est-clinic",
            "Poblacion Dental Clinic",
            EstablishmentStatus::Registered,
        ))
        .with_establishment(establishment(
            "est-print",
            "Plaza Print Shop",
            EstablishmentStatus::PreRegistered,
        ))
        .with_application(application(
            "app-1001",
            "est-bakery",
            ApplicationType::FsicBusiness,
            ApplicationStatus::Approved,
        ))
        .with_application(application(
            "app-1002",
            "est-clinic",
            ApplicationType::FsicOccupancy,
            ApplicationStatus::Pending,
        ))
        .with_application(application(
            "app-1003",
            "est-clinic",
            ApplicationType::Fsec,
            ApplicationStatus::Approved,
        ))
        .with_inspection(missed))
}
