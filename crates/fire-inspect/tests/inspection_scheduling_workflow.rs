//! Integration specifications for inspection scheduling and lifecycle.
//!
//! Scenarios run through the public scheduler facade with the in-memory store so the
//! availability rules, the expiry sweep, and the review transitions are exercised together.

mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveTime};

    use fire_inspect::workflows::inspections::{
        Application, ApplicationId, ApplicationStatus, ApplicationType, DutyStatus, Establishment,
        EstablishmentId, EstablishmentStatus, FixedClock, InMemoryNotificationPublisher,
        InMemorySchedulingStore, Inspection, InspectionId, InspectionScheduler, InspectionStatus,
        InspectionType, Inspector, InspectorId, RetryPolicy, ScheduleRequest, ScheduleWindow,
        UserRole,
    };

    pub(super) type Scheduler =
        InspectionScheduler<InMemorySchedulingStore, InMemoryNotificationPublisher>;

    pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    pub(super) fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    pub(super) fn inspector_i() -> Inspector {
        Inspector {
            id: InspectorId::new("inspector-i"),
            name: "Inspector I".to_string(),
            role: UserRole::Inspector,
            duty_status: DutyStatus::OnDuty,
            availability_start: Some(date(2025, 1, 1)),
            availability_end: Some(date(2025, 1, 31)),
        }
    }

    pub(super) fn inspection(id: &str) -> Inspection {
        Inspection {
            id: InspectionId::new(id),
            establishment_id: EstablishmentId::new("est-100"),
            establishment_name: "Poblacion Dental Clinic".to_string(),
            inspector_id: None,
            inspector_name: None,
            inspection_type: InspectionType::FsicOccupancy,
            status: InspectionStatus::Pending,
            schedule: None,
            application_id: ApplicationId::new(format!("app-{id}")),
            rejection: None,
            certificate_url: None,
        }
    }

    pub(super) fn booked(id: &str, status: InspectionStatus, window: ScheduleWindow) -> Inspection {
        Inspection {
            inspector_id: Some(InspectorId::new("inspector-i")),
            inspector_name: Some("Inspector I".to_string()),
            status,
            schedule: Some(window),
            ..inspection(id)
        }
    }

    pub(super) fn slot(day: NaiveDate, start: NaiveTime, end: NaiveTime) -> ScheduleRequest {
        ScheduleRequest::new(day, start, end, InspectorId::new("inspector-i"))
    }

    pub(super) fn store() -> InMemorySchedulingStore {
        InMemorySchedulingStore::new()
            .with_inspector(inspector_i())
            .with_establishment(Establishment {
                id: EstablishmentId::new("est-100"),
                owner_id: "owner-100".to_string(),
                name: "Poblacion Dental Clinic".to_string(),
                status: EstablishmentStatus::Registered,
                registered_at: None,
            })
            .with_inspection(inspection("x"))
    }

    pub(super) fn approved_application(id: &str) -> Application {
        Application {
            id: ApplicationId::new(id),
            establishment_id: EstablishmentId::new("est-100"),
            application_type: ApplicationType::FsicBusiness,
            status: ApplicationStatus::Approved,
        }
    }

    pub(super) fn scheduler_on(
        store: InMemorySchedulingStore,
        today: NaiveDate,
    ) -> (Arc<Scheduler>, Arc<InMemoryNotificationPublisher>) {
        let notices = Arc::new(InMemoryNotificationPublisher::default());
        let scheduler = Arc::new(InspectionScheduler::with_parts(
            Arc::new(store),
            Arc::clone(&notices),
            Arc::new(FixedClock::on(today)),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
        ));
        (scheduler, notices)
    }
}

use common::*;
use fire_inspect::workflows::inspections::{
    Ineligibility, InspectionFilter, InspectionId, InspectionStatus, ScheduleWindow,
    SchedulingError,
};

#[tokio::test]
async fn scenario_a_on_duty_inspector_takes_a_free_slot() {
    let (scheduler, _) = scheduler_on(store(), date(2025, 1, 2));

    let scheduled = scheduler
        .schedule_and_assign(
            &InspectionId::new("x"),
            slot(date(2025, 1, 10), time(9, 0), time(10, 0)),
        )
        .await
        .expect("slot is free");

    assert_eq!(scheduled.status, InspectionStatus::Scheduled);
    let window = scheduled.schedule.expect("window");
    assert!(window.end() > window.start());
}

#[tokio::test]
async fn scenario_b_overlap_is_refused_and_x_stays_pending() {
    let y_window = ScheduleWindow::on(date(2025, 1, 10), time(9, 30), time(10, 30)).expect("valid");
    let (scheduler, _) = scheduler_on(
        store().with_inspection(booked("y", InspectionStatus::Scheduled, y_window)),
        date(2025, 1, 2),
    );

    let result = scheduler
        .schedule_and_assign(
            &InspectionId::new("x"),
            slot(date(2025, 1, 10), time(9, 0), time(10, 0)),
        )
        .await;
    assert!(matches!(
        result,
        Err(SchedulingError::Conflict {
            reason: Ineligibility::Overlaps(_),
            ..
        })
    ));

    let x = scheduler
        .inspection(&InspectionId::new("x"))
        .await
        .expect("x");
    assert_eq!(x.status, InspectionStatus::Pending);
}

#[tokio::test]
async fn scenario_c_missed_slot_is_cancelled_on_read() {
    let window = ScheduleWindow::on(date(2024, 12, 1), time(9, 0), time(10, 0)).expect("valid");
    let (scheduler, _) = scheduler_on(
        store().with_inspection(booked("old", InspectionStatus::Scheduled, window)),
        date(2025, 1, 1),
    );

    let cancelled = scheduler
        .inspections(&InspectionFilter::default().with_status(InspectionStatus::Cancelled))
        .await
        .expect("listing");
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, InspectionId::new("old"));
}

#[tokio::test]
async fn scenario_d_rejection_then_reinspection() {
    let window = ScheduleWindow::on(date(2025, 1, 3), time(13, 0), time(14, 0)).expect("valid");
    let (scheduler, _) = scheduler_on(
        store().with_inspection(booked("x", InspectionStatus::Scheduled, window)),
        date(2025, 1, 3),
    );
    let x = InspectionId::new("x");

    scheduler.complete_inspection(&x).await.expect("visited");
    let rejected = scheduler
        .reject(
            &x,
            vec!["Incomplete establishment information".to_string()],
            "missing checklist",
        )
        .await
        .expect("rejected");
    assert_eq!(rejected.status, InspectionStatus::Rejected);

    let reopened = scheduler.request_reinspection(&x).await.expect("reopened");
    assert_eq!(reopened.status, InspectionStatus::Pending);
    assert!(reopened.schedule.is_none());
}

#[tokio::test]
async fn scenario_e_approval_is_idempotent() {
    let window = ScheduleWindow::on(date(2025, 1, 3), time(13, 0), time(14, 0)).expect("valid");
    let (scheduler, notices) = scheduler_on(
        store().with_inspection(booked("x", InspectionStatus::Inspected, window)),
        date(2025, 1, 3),
    );
    let x = InspectionId::new("x");

    let first = scheduler
        .approve(&x, "https://host/cert.pdf")
        .await
        .expect("approved");
    let second = scheduler
        .approve(&x, "https://host/cert.pdf")
        .await
        .expect("no-op");

    assert_eq!(first, second);
    assert_eq!(second.status, InspectionStatus::Approved);
    assert_eq!(second.certificate_url.as_deref(), Some("https://host/cert.pdf"));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(notices.notices().await.len(), 1);
}

#[tokio::test]
async fn no_two_slot_holding_inspections_overlap_for_one_inspector() {
    let (scheduler, _) = scheduler_on(
        store()
            .with_inspection(inspection("p"))
            .with_inspection(inspection("q"))
            .with_inspection(inspection("r")),
        date(2025, 1, 2),
    );

    let attempts = [
        ("x", time(8, 0), time(9, 0)),
        ("p", time(8, 30), time(9, 30)),
        ("q", time(9, 0), time(10, 0)),
        ("r", time(9, 45), time(11, 0)),
    ];
    for (id, start, end) in attempts {
        let _ = scheduler
            .schedule_and_assign(&InspectionId::new(id), slot(date(2025, 1, 10), start, end))
            .await;
    }

    let booked = scheduler
        .inspections(&InspectionFilter::default())
        .await
        .expect("listing");
    let windows: Vec<ScheduleWindow> = booked
        .iter()
        .filter(|inspection| inspection.status.holds_slot())
        .filter_map(|inspection| inspection.schedule)
        .collect();

    assert_eq!(windows.len(), 2);
    for (i, a) in windows.iter().enumerate() {
        for b in windows.iter().skip(i + 1) {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
}

#[tokio::test]
async fn approved_application_resolves_to_one_identity() {
    let (scheduler, _) = scheduler_on(
        store().with_application(approved_application("app-42")),
        date(2025, 1, 2),
    );

    let via_sync = scheduler
        .synchronizer()
        .get_or_create(&fire_inspect::workflows::inspections::ApplicationId::new("app-42"))
        .await
        .expect("resolves");
    let listed = scheduler
        .inspections(&InspectionFilter::default().with_status(InspectionStatus::Pending))
        .await
        .expect("listing");

    let matching: Vec<_> = listed
        .iter()
        .filter(|inspection| inspection.id == via_sync.id)
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(via_sync.id, InspectionId::new("insp-app-42"));
}
