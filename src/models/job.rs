use crate::models::skill::SkillId;
use crate::models::worker::GeoPoint;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Controls how strictly availability fitness gates candidate inclusion:
/// an `Emergency` job drops candidates with no fitting window at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Standard,
    Urgent,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Matched,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    pub required_skill: SkillId,
    /// Minimum self-declared proficiency (1..=5) a candidate must claim.
    pub min_proficiency: u8,
    pub location: GeoPoint,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub urgency: UrgencyTier,
    pub duration_minutes: i64,
    pub posted_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl JobPosting {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn is_open(&self) -> bool {
        self.status == JobStatus::Open
    }
}
