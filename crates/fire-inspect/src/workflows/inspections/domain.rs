use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use super::schedule::ScheduleWindow;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }
    };
}

string_id!(
    /// Identity of an inspection row, stable across reads once derived from its application.
    InspectionId
);
string_id!(InspectorId);
string_id!(ApplicationId);
string_id!(EstablishmentId);

impl InspectionId {
    /// Deterministic identity for the inspection an approved application gives rise to.
    pub fn for_application(application_id: &ApplicationId) -> Self {
        Self(format!("insp-{}", application_id.0))
    }
}

/// Roles a user profile can hold; only `Inspector` may be assigned inspections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Inspector,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyStatus {
    OnDuty,
    OffDuty,
}

/// The slice of a user profile the availability rules read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspector {
    pub id: InspectorId,
    pub name: String,
    pub role: UserRole,
    pub duty_status: DutyStatus,
    /// Open-ended when absent.
    pub availability_start: Option<NaiveDate>,
    /// Open-ended when absent.
    pub availability_end: Option<NaiveDate>,
}

impl Inspector {
    pub fn available_on(&self, date: NaiveDate) -> bool {
        let after_start = self.availability_start.map_or(true, |start| date >= start);
        let before_end = self.availability_end.map_or(true, |end| date <= end);
        after_start && before_end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InspectionType {
    #[serde(rename = "FSIC-Occupancy")]
    FsicOccupancy,
    #[serde(rename = "FSIC-Business")]
    FsicBusiness,
}

impl InspectionType {
    pub const fn label(self) -> &'static str {
        match self {
            InspectionType::FsicOccupancy => "FSIC-Occupancy",
            InspectionType::FsicBusiness => "FSIC-Business",
        }
    }
}

/// Inspection lifecycle.
///
/// `pending -> scheduled -> inspected -> approved | rejected`, with `scheduled -> pending`
/// (clear), `scheduled -> cancelled` (expiry), and `rejected -> pending` (re-inspection).
/// `approved` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Pending,
    Scheduled,
    Inspected,
    Approved,
    Rejected,
    Cancelled,
}

impl InspectionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InspectionStatus::Pending => "pending",
            InspectionStatus::Scheduled => "scheduled",
            InspectionStatus::Inspected => "inspected",
            InspectionStatus::Approved => "approved",
            InspectionStatus::Rejected => "rejected",
            InspectionStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, InspectionStatus::Approved | InspectionStatus::Cancelled)
    }

    /// Whether an inspection in this status still occupies its inspector's time slot.
    pub const fn holds_slot(self) -> bool {
        matches!(
            self,
            InspectionStatus::Scheduled | InspectionStatus::Inspected | InspectionStatus::Approved
        )
    }

    pub fn can_transition_to(self, next: InspectionStatus) -> bool {
        use InspectionStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Scheduled, Scheduled)
                | (Scheduled, Pending)
                | (Scheduled, Cancelled)
                | (Scheduled, Inspected)
                | (Inspected, Approved)
                | (Inspected, Rejected)
                | (Rejected, Pending)
        )
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Reasons captured when an inspection fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionDetails {
    pub reasons: Vec<String>,
    pub notes: String,
}

impl RejectionDetails {
    pub fn summary(&self) -> String {
        let reasons = self.reasons.join("; ");
        if self.notes.trim().is_empty() {
            reasons
        } else {
            format!("{reasons} ({})", self.notes.trim())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: InspectionId,
    pub establishment_id: EstablishmentId,
    pub establishment_name: String,
    pub inspector_id: Option<InspectorId>,
    pub inspector_name: Option<String>,
    #[serde(rename = "type")]
    pub inspection_type: InspectionType,
    pub status: InspectionStatus,
    #[serde(flatten)]
    pub schedule: Option<ScheduleWindow>,
    pub application_id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
}

impl Inspection {
    /// A fresh, unassigned inspection for an approved application.
    pub fn pending_for(
        application: &Application,
        inspection_type: InspectionType,
        establishment_name: impl Into<String>,
    ) -> Self {
        Self {
            id: InspectionId::for_application(&application.id),
            establishment_id: application.establishment_id.clone(),
            establishment_name: establishment_name.into(),
            inspector_id: None,
            inspector_name: None,
            inspection_type,
            status: InspectionStatus::Pending,
            schedule: None,
            application_id: application.id.clone(),
            rejection: None,
            certificate_url: None,
        }
    }

    pub fn rejection_reason(&self) -> Option<String> {
        self.rejection.as_ref().map(RejectionDetails::summary)
    }

    pub(crate) fn clear_assignment(&mut self) {
        self.inspector_id = None;
        self.inspector_name = None;
        self.schedule = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    #[serde(rename = "FSEC")]
    Fsec,
    #[serde(rename = "FSIC-Occupancy")]
    FsicOccupancy,
    #[serde(rename = "FSIC-Business")]
    FsicBusiness,
}

impl ApplicationType {
    /// FSEC is a plan-stage clearance and never goes through a physical inspection.
    pub const fn inspection_type(self) -> Option<InspectionType> {
        match self {
            ApplicationType::Fsec => None,
            ApplicationType::FsicOccupancy => Some(InspectionType::FsicOccupancy),
            ApplicationType::FsicBusiness => Some(InspectionType::FsicBusiness),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub establishment_id: EstablishmentId,
    #[serde(rename = "type")]
    pub application_type: ApplicationType,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishmentStatus {
    Unregistered,
    PreRegistered,
    Registered,
}

impl EstablishmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EstablishmentStatus::Unregistered => "unregistered",
            EstablishmentStatus::PreRegistered => "pre_registered",
            EstablishmentStatus::Registered => "registered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub id: EstablishmentId,
    pub owner_id: String,
    pub name: String,
    pub status: EstablishmentStatus,
    pub registered_at: Option<DateTime<FixedOffset>>,
}

/// One admin rejection of an establishment registration. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionEntry {
    pub reasons: Vec<String>,
    pub notes: String,
    pub timestamp: DateTime<FixedOffset>,
}

/// Audit record for a committed inspection status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionEvent {
    pub inspection_id: InspectionId,
    pub from: InspectionStatus,
    pub to: InspectionStatus,
    pub at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Input rejected before any store interaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("an inspection date is required")]
    MissingDate,
    #[error("a start time is required")]
    MissingStartTime,
    #[error("an end time is required")]
    MissingEndTime,
    #[error("an inspector must be selected")]
    MissingInspector,
    #[error("'{0}' is not a valid time of day (expected HH:MM or h:MM AM/PM)")]
    InvalidTime(String),
    #[error("end time {end} must be after start time {start}")]
    EmptyWindow { start: String, end: String },
    #[error("{date} is in the past (today is {today})")]
    PastDate { date: NaiveDate, today: NaiveDate },
    #[error("at least one rejection reason is required")]
    MissingReasons,
    #[error("a certificate URL is required to approve an inspection")]
    MissingCertificateUrl,
}
