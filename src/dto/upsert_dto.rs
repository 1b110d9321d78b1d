use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::job::UrgencyTier;

/// Skill as claimed at the boundary: free text or a canonical id, resolved
/// against the taxonomy before anything is stored.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SkillClaimPayload {
    #[validate(length(min = 1))]
    pub skill: String,
    #[validate(range(min = 1, max = 5))]
    pub proficiency: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpsertWorkerPayload {
    /// Present on updates, absent on first registration.
    pub id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1), nested)]
    pub skills: Vec<SkillClaimPayload>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 0.5, max = 500.0))]
    pub service_radius_km: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostJobPayload {
    pub employer_id: Uuid,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub required_skill: String,
    #[validate(range(min = 1, max = 5))]
    pub min_proficiency: u8,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub urgency: UrgencyTier,
    #[validate(range(min = 15, max = 14400))]
    pub duration_minutes: i64,
    /// Defaults to the engine clock when absent.
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateCompletionPayload {
    pub worker_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    pub completed_at: Option<DateTime<Utc>>,
}
