use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-candidate sub-scores, pre-weighting. Returned with every ranked
/// candidate so callers can show *why* someone ranked where they did;
/// marketplace trust depends on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Proficiency credit after taxonomy-distance attenuation, 0.0..=1.0.
    pub skill: f64,
    /// 1 - distance/radius, floored at 0.
    pub distance: f64,
    /// Reputation normalized to 0.0..=1.0.
    pub reputation: f64,
    /// Availability fitness, 0.0..=1.0.
    pub availability: f64,
    /// Taxonomy hops between the claimed and required skill (0 = exact).
    pub taxonomy_distance: u32,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Worker id for job->workers queries, job id for worker->jobs queries.
    pub id: Uuid,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPage {
    pub items: Vec<MatchCandidate>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

impl MatchPage {
    pub fn empty(page: usize, page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            page,
            page_size,
            total: 0,
        }
    }
}
