//! Inspector eligibility for a proposed slot.
//!
//! Pure functions over a roster snapshot and the inspections already on the books. The
//! caller validates the slot itself (`ScheduleWindow` cannot be empty), so every failure
//! here is an eligibility failure.

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{DutyStatus, Inspection, InspectionId, Inspector, InspectorId, UserRole};
use super::schedule::ScheduleWindow;

/// Why an inspector cannot take a slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ineligibility {
    #[error("inspector {0} is not on the roster")]
    UnknownInspector(InspectorId),
    #[error("user {0} does not hold the inspector role")]
    NotAnInspector(InspectorId),
    #[error("inspector is off duty")]
    OffDuty,
    #[error("{date} is outside the inspector's availability window")]
    OutsideAvailability { date: NaiveDate },
    #[error("slot overlaps inspection {0}")]
    Overlaps(InspectionId),
}

/// Eligible inspectors for a slot, with "nobody" as its own answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "inspectors", rename_all = "snake_case")]
pub enum EligibleInspectors {
    Available(Vec<Inspector>),
    NoneEligible,
}

impl EligibleInspectors {
    pub fn is_empty(&self) -> bool {
        matches!(self, EligibleInspectors::NoneEligible)
    }

    pub fn inspectors(&self) -> &[Inspector] {
        match self {
            EligibleInspectors::Available(inspectors) => inspectors,
            EligibleInspectors::NoneEligible => &[],
        }
    }

    pub fn into_vec(self) -> Vec<Inspector> {
        match self {
            EligibleInspectors::Available(inspectors) => inspectors,
            EligibleInspectors::NoneEligible => Vec::new(),
        }
    }
}

/// Runs the eligibility rules in order and returns the roster entry on success.
///
/// `rescheduling` names the inspection being moved so its own current slot never blocks it.
pub fn check<'a>(
    inspector_id: &InspectorId,
    window: &ScheduleWindow,
    roster: &'a [Inspector],
    existing: &[Inspection],
    rescheduling: Option<&InspectionId>,
) -> Result<&'a Inspector, Ineligibility> {
    let inspector = roster
        .iter()
        .find(|candidate| &candidate.id == inspector_id)
        .ok_or_else(|| Ineligibility::UnknownInspector(inspector_id.clone()))?;

    evaluate(inspector, window, existing, rescheduling)?;
    Ok(inspector)
}

pub fn is_eligible(
    inspector_id: &InspectorId,
    window: &ScheduleWindow,
    roster: &[Inspector],
    existing: &[Inspection],
    rescheduling: Option<&InspectionId>,
) -> bool {
    check(inspector_id, window, roster, existing, rescheduling).is_ok()
}

/// Every roster entry that could take `window`, in roster order.
pub fn eligible_inspectors(
    window: &ScheduleWindow,
    roster: &[Inspector],
    existing: &[Inspection],
) -> EligibleInspectors {
    let eligible: Vec<Inspector> = roster
        .iter()
        .filter(|inspector| evaluate(inspector, window, existing, None).is_ok())
        .cloned()
        .collect();

    if eligible.is_empty() {
        EligibleInspectors::NoneEligible
    } else {
        EligibleInspectors::Available(eligible)
    }
}

fn evaluate(
    inspector: &Inspector,
    window: &ScheduleWindow,
    existing: &[Inspection],
    rescheduling: Option<&InspectionId>,
) -> Result<(), Ineligibility> {
    if inspector.role != UserRole::Inspector {
        return Err(Ineligibility::NotAnInspector(inspector.id.clone()));
    }
    if inspector.duty_status != DutyStatus::OnDuty {
        return Err(Ineligibility::OffDuty);
    }

    let date = window.date();
    if !inspector.available_on(date) {
        return Err(Ineligibility::OutsideAvailability { date });
    }

    match first_overlap(&inspector.id, window, existing, rescheduling) {
        Some(conflict) => Err(Ineligibility::Overlaps(conflict.id.clone())),
        None => Ok(()),
    }
}

/// First committed slot of `inspector_id` that intersects `window`.
pub fn first_overlap<'a>(
    inspector_id: &InspectorId,
    window: &ScheduleWindow,
    existing: &'a [Inspection],
    rescheduling: Option<&InspectionId>,
) -> Option<&'a Inspection> {
    existing.iter().find(|inspection| {
        rescheduling != Some(&inspection.id)
            && inspection.status.holds_slot()
            && inspection.inspector_id.as_ref() == Some(inspector_id)
            && inspection
                .schedule
                .as_ref()
                .is_some_and(|slot| slot.overlaps(window))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::inspections::domain::{
        ApplicationId, EstablishmentId, InspectionStatus, InspectionType,
    };
    use chrono::NaiveTime;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).expect("valid date")
    }

    fn slot(d: u32, start: (u32, u32), end: (u32, u32)) -> ScheduleWindow {
        ScheduleWindow::on(
            day(d),
            NaiveTime::from_hms_opt(start.0, start.1, 0).expect("valid"),
            NaiveTime::from_hms_opt(end.0, end.1, 0).expect("valid"),
        )
        .expect("valid window")
    }

    fn inspector(id: &str) -> Inspector {
        Inspector {
            id: InspectorId::new(id),
            name: format!("Inspector {id}"),
            role: UserRole::Inspector,
            duty_status: DutyStatus::OnDuty,
            availability_start: Some(day(1)),
            availability_end: Some(day(31)),
        }
    }

    fn booked(id: &str, inspector: &str, status: InspectionStatus, window: ScheduleWindow) -> Inspection {
        Inspection {
            id: InspectionId::new(id),
            establishment_id: EstablishmentId::new("est-1"),
            establishment_name: "Harbor View Suites".to_string(),
            inspector_id: Some(InspectorId::new(inspector)),
            inspector_name: Some(format!("Inspector {inspector}")),
            inspection_type: InspectionType::FsicBusiness,
            status,
            schedule: Some(window),
            application_id: ApplicationId::new(format!("app-{id}")),
            rejection: None,
            certificate_url: None,
        }
    }

    #[test]
    fn on_duty_inspector_within_window_is_eligible() {
        let roster = vec![inspector("i-1")];
        let window = slot(10, (9, 0), (10, 0));
        let chosen = check(&InspectorId::new("i-1"), &window, &roster, &[], None)
            .expect("eligible");
        assert_eq!(chosen.id, InspectorId::new("i-1"));
    }

    #[test]
    fn unknown_inspector_is_reported() {
        let window = slot(10, (9, 0), (10, 0));
        assert_eq!(
            check(&InspectorId::new("ghost"), &window, &[], &[], None),
            Err(Ineligibility::UnknownInspector(InspectorId::new("ghost")))
        );
    }

    #[test]
    fn off_duty_and_non_inspectors_are_rejected() {
        let mut off_duty = inspector("i-1");
        off_duty.duty_status = DutyStatus::OffDuty;
        let mut owner = inspector("o-1");
        owner.role = UserRole::Owner;
        let roster = vec![off_duty, owner];
        let window = slot(10, (9, 0), (10, 0));

        assert_eq!(
            check(&InspectorId::new("i-1"), &window, &roster, &[], None),
            Err(Ineligibility::OffDuty)
        );
        assert_eq!(
            check(&InspectorId::new("o-1"), &window, &roster, &[], None),
            Err(Ineligibility::NotAnInspector(InspectorId::new("o-1")))
        );
    }

    #[test]
    fn dates_outside_availability_are_rejected() {
        let roster = vec![inspector("i-1")];
        let window = ScheduleWindow::on(
            NaiveDate::from_ymd_opt(2025, 2, 3).expect("valid"),
            NaiveTime::from_hms_opt(9, 0, 0).expect("valid"),
            NaiveTime::from_hms_opt(10, 0, 0).expect("valid"),
        )
        .expect("valid window");

        assert!(matches!(
            check(&InspectorId::new("i-1"), &window, &roster, &[], None),
            Err(Ineligibility::OutsideAvailability { .. })
        ));
    }

    #[test]
    fn overlapping_slot_blocks_but_adjacent_does_not() {
        let roster = vec![inspector("i-1")];
        let existing = vec![booked(
            "y",
            "i-1",
            InspectionStatus::Scheduled,
            slot(10, (9, 30), (10, 30)),
        )];

        assert_eq!(
            check(
                &InspectorId::new("i-1"),
                &slot(10, (9, 0), (10, 0)),
                &roster,
                &existing,
                None
            ),
            Err(Ineligibility::Overlaps(InspectionId::new("y")))
        );
        assert!(is_eligible(
            &InspectorId::new("i-1"),
            &slot(10, (10, 30), (11, 30)),
            &roster,
            &existing,
            None
        ));
    }

    #[test]
    fn rescheduled_inspection_does_not_block_itself() {
        let roster = vec![inspector("i-1")];
        let existing = vec![booked(
            "x",
            "i-1",
            InspectionStatus::Scheduled,
            slot(10, (9, 0), (10, 0)),
        )];
        let moved = slot(10, (9, 30), (10, 30));

        assert!(is_eligible(
            &InspectorId::new("i-1"),
            &moved,
            &roster,
            &existing,
            Some(&InspectionId::new("x"))
        ));
        // The inspector's id must never be mistaken for the inspection being moved.
        assert!(!is_eligible(
            &InspectorId::new("i-1"),
            &moved,
            &roster,
            &existing,
            Some(&InspectionId::new("i-1"))
        ));
    }

    #[test]
    fn released_slots_do_not_block() {
        let roster = vec![inspector("i-1")];
        let window = slot(10, (9, 0), (10, 0));
        let existing = vec![
            booked("cancelled", "i-1", InspectionStatus::Cancelled, window),
            booked("rejected", "i-1", InspectionStatus::Rejected, window),
        ];
        assert!(is_eligible(&InspectorId::new("i-1"), &window, &roster, &existing, None));

        let inspected = vec![booked("done", "i-1", InspectionStatus::Inspected, window)];
        assert!(!is_eligible(&InspectorId::new("i-1"), &window, &roster, &inspected, None));
    }

    #[test]
    fn eligible_set_distinguishes_nobody() {
        let mut off_duty = inspector("i-2");
        off_duty.duty_status = DutyStatus::OffDuty;
        let roster = vec![inspector("i-1"), off_duty];
        let window = slot(10, (9, 0), (10, 0));

        let available = eligible_inspectors(&window, &roster, &[]);
        assert_eq!(available.inspectors().len(), 1);
        assert_eq!(available.inspectors()[0].id, InspectorId::new("i-1"));

        let existing = vec![booked("y", "i-1", InspectionStatus::Scheduled, window)];
        let nobody = eligible_inspectors(&window, &roster, &existing);
        assert_eq!(nobody, EligibleInspectors::NoneEligible);
        assert!(nobody.is_empty());
        assert!(nobody.into_vec().is_empty());
    }

    #[test]
    fn eligible_set_serializes_with_status_tag() {
        let json = serde_json::to_value(EligibleInspectors::NoneEligible).expect("serializes");
        assert_eq!(json, serde_json::json!({ "status": "none_eligible" }));
    }
}
