//! Demotes scheduled inspections whose day has passed.
//!
//! The sweep runs inline on every read of the working set, so it must be idempotent: a
//! second pass over its own output finds nothing left to expire.

use chrono::NaiveDate;

use super::domain::{Inspection, InspectionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// The full working set after expiry.
    pub inspections: Vec<Inspection>,
    /// Rows that changed in this pass and still need persisting.
    pub expired: Vec<Inspection>,
}

/// `scheduled` with a start earlier than local midnight of `today`.
pub fn is_overdue(inspection: &Inspection, today: NaiveDate) -> bool {
    inspection.status == InspectionStatus::Scheduled
        && inspection
            .schedule
            .as_ref()
            .is_some_and(|window| window.starts_before(today))
}

pub fn sweep(inspections: Vec<Inspection>, today: NaiveDate) -> SweepOutcome {
    let mut expired = Vec::new();
    let inspections = inspections
        .into_iter()
        .map(|mut inspection| {
            if is_overdue(&inspection, today) {
                inspection.status = InspectionStatus::Cancelled;
                expired.push(inspection.clone());
            }
            inspection
        })
        .collect();

    SweepOutcome {
        inspections,
        expired,
    }
}
