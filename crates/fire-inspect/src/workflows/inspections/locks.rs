use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::domain::InspectorId;

type Calendars = HashMap<InspectorId, Arc<Mutex<()>>>;

/// One async mutex per inspector's calendar.
///
/// The eligibility read and the reserving write both happen while the guard is held, so two
/// assignments to the same inspector cannot both pass the overlap check. An inspector's entry
/// is dropped once nobody holds or waits on its lock.
#[derive(Debug, Default)]
pub struct ScheduleLocks {
    calendars: Arc<StdMutex<Calendars>>,
}

/// Held for the duration of a check-and-reserve on one inspector's calendar.
#[derive(Debug)]
pub struct CalendarGuard {
    inspector_id: InspectorId,
    calendar: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
    calendars: Arc<StdMutex<Calendars>>,
}

impl ScheduleLocks {
    pub async fn acquire(&self, inspector_id: &InspectorId) -> CalendarGuard {
        let calendar = {
            let mut calendars = self
                .calendars
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(calendars.entry(inspector_id.clone()).or_default())
        };
        let held = Arc::clone(&calendar).lock_owned().await;
        CalendarGuard {
            inspector_id: inspector_id.clone(),
            calendar,
            held: Some(held),
            calendars: Arc::clone(&self.calendars),
        }
    }

    /// Number of inspectors with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.calendars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for CalendarGuard {
    fn drop(&mut self) {
        self.held.take();
        let mut calendars = self
            .calendars
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and this guard hold the only references: no waiter is queued behind us.
        if Arc::strong_count(&self.calendar) == 2 {
            calendars.remove(&self.inspector_id);
        }
    }
}
