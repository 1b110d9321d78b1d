use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single completed-job rating. Samples are append-only; corrections are
/// new samples, never edits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatingSample {
    pub rating: u8,
    pub completed_at: DateTime<Utc>,
}

/// Exported form of a worker's aggregated reputation, as loaded from and
/// handed back to the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub worker_id: Uuid,
    pub score: f64,
    pub sample_count: usize,
    pub last_updated: DateTime<Utc>,
}
