use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::availability::AvailabilityWindow;
use crate::models::job::JobPosting;
use crate::models::reputation::RatingSample;
use crate::models::worker::WorkerProfile;

/// Cold-start payload assembled by the storage collaborator. Everything here
/// is already canonical; skills are validated against the taxonomy during
/// rebuild and offending entities are skipped with a warning rather than
/// poisoning the whole load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub workers: Vec<WorkerProfile>,
    pub jobs: Vec<JobPosting>,
    pub availability_windows: Vec<AvailabilityWindow>,
    pub ratings: Vec<(Uuid, Vec<RatingSample>)>,
}

/// Counts reported back after a rebuild, mostly for startup logging.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RebuildReport {
    pub workers: usize,
    pub jobs: usize,
    pub windows: usize,
    pub rated_workers: usize,
    pub skipped: usize,
}
