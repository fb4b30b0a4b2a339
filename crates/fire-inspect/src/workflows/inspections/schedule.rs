//! Time handling for inspection slots.
//!
//! Every slot is stored as a pair of absolute timestamps in the single fixed UTC+8 offset
//! the inspection office operates in. Local dates and times of day are converted exactly
//! once, when a request enters the system.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::domain::{InspectorId, ValidationError};

pub const SCHEDULE_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub fn schedule_offset() -> FixedOffset {
    FixedOffset::east_opt(SCHEDULE_UTC_OFFSET_SECS).expect("UTC+8 is a valid fixed offset")
}

/// Midnight at the start of `date`, in the scheduling offset.
pub fn start_of_day(date: NaiveDate) -> DateTime<FixedOffset> {
    local_instant(date, NaiveTime::MIN)
}

fn local_instant(date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    let offset = schedule_offset();
    // A fixed offset maps every local time to exactly one instant.
    match offset.from_local_datetime(&date.and_time(time)).single() {
        Some(instant) => instant,
        None => offset.from_utc_datetime(&date.and_time(time)),
    }
}

/// A half-open `[start, end)` interval with `end > start`.
///
/// Deserialization goes through [`ScheduleWindow::new`], so rows read back from a store are
/// held to the same bounds as fresh requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredWindow")]
pub struct ScheduleWindow {
    #[serde(rename = "scheduled_start")]
    start: DateTime<FixedOffset>,
    #[serde(rename = "scheduled_end")]
    end: DateTime<FixedOffset>,
}

#[derive(Deserialize)]
struct StoredWindow {
    scheduled_start: DateTime<FixedOffset>,
    scheduled_end: DateTime<FixedOffset>,
}

impl TryFrom<StoredWindow> for ScheduleWindow {
    type Error = ValidationError;

    fn try_from(stored: StoredWindow) -> Result<Self, Self::Error> {
        Self::new(stored.scheduled_start, stored.scheduled_end)
    }
}

impl ScheduleWindow {
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EmptyWindow {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            });
        }
        let offset = schedule_offset();
        Ok(Self {
            start: start.with_timezone(&offset),
            end: end.with_timezone(&offset),
        })
    }

    /// Builds the window for a local date and time-of-day pair.
    pub fn on(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EmptyWindow {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            });
        }
        Self::new(local_instant(date, start), local_instant(date, end))
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Local calendar date the slot begins on.
    pub fn date(&self) -> NaiveDate {
        self.start.with_timezone(&schedule_offset()).date_naive()
    }

    pub fn overlaps(&self, other: &ScheduleWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn starts_before(&self, date: NaiveDate) -> bool {
        self.start < start_of_day(date)
    }
}

/// Parses `HH:MM`, `HH:MM:SS`, or twelve-hour `h:MM AM/PM`.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = raw.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ValidationError::InvalidTime(raw.to_string()))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.filter(|value| !value.trim().is_empty())
        .map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.filter(|value| !value.trim().is_empty())
        .map(|value| parse_time_of_day(&value).map_err(serde::de::Error::custom))
        .transpose()
}

/// Raw scheduling input as it arrives from a form; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub inspector_id: Option<InspectorId>,
}

impl ScheduleRequest {
    pub fn new(
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        inspector_id: InspectorId,
    ) -> Self {
        Self {
            date: Some(date),
            start_time: Some(start_time),
            end_time: Some(end_time),
            inspector_id: Some(inspector_id),
        }
    }

    /// Checks presence and ordering, and that the slot is not on a day already gone.
    pub fn validate(&self, today: NaiveDate) -> Result<(InspectorId, ScheduleWindow), ValidationError> {
        let date = self.date.ok_or(ValidationError::MissingDate)?;
        let start = self.start_time.ok_or(ValidationError::MissingStartTime)?;
        let end = self.end_time.ok_or(ValidationError::MissingEndTime)?;
        let inspector_id = self
            .inspector_id
            .clone()
            .filter(|id| !id.as_str().trim().is_empty())
            .ok_or(ValidationError::MissingInspector)?;

        let window = ScheduleWindow::on(date, start, end)?;
        if date < today {
            return Err(ValidationError::PastDate { date, today });
        }

        Ok((inspector_id, window))
    }
}
