use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a window: free -> held -> booked -> free (completion or
/// cancellation), or held -> free when a hold is released or expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum WindowState {
    Free,
    Held {
        hold_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    Booked,
}

/// One contiguous interval of a worker's calendar. Windows belonging to the
/// same worker never overlap; the ledger enforces this on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub worker_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: WindowState,
}

impl AvailabilityWindow {
    pub fn free(worker_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            start,
            end,
            state: WindowState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == WindowState::Free
    }

    pub fn is_booked(&self) -> bool {
        self.state == WindowState::Booked
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Ephemeral pessimistic reservation taken while an offer is negotiated.
/// Exactly one live hold may cover any instant of a worker's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateHold {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
