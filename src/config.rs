use crate::error::{Error, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;

/// Scoring weights for the composite match score. They are not required to
/// sum to 1.0, but the defaults do so the score stays in 0.0..=1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    pub w_skill: f64,
    pub w_distance: f64,
    pub w_reputation: f64,
    pub w_urgency: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            w_skill: 0.35,
            w_distance: 0.25,
            w_reputation: 0.2,
            w_urgency: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Radius used for job -> worker candidate queries when the job itself
    /// carries no narrower constraint.
    pub default_search_radius_km: f64,
    pub hold_ttl_seconds: i64,
    pub reputation_half_life_days: f64,
    /// Score assumed for workers with no completed-job ratings yet.
    pub reputation_neutral_prior: f64,
    pub weights: Weights,
    /// Maximum taxonomy hops (ancestor/descendant) still considered a skill match.
    pub taxonomy_distance_limit: u32,
    pub page_size_default: usize,
    pub page_size_max: usize,
    pub sweep_interval_seconds: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            default_search_radius_km: 25.0,
            hold_ttl_seconds: 120,
            reputation_half_life_days: 90.0,
            reputation_neutral_prior: 3.0,
            weights: Weights::default(),
            taxonomy_distance_limit: 2,
            page_size_default: 20,
            page_size_max: 100,
            sweep_interval_seconds: 30,
        }
    }
}

impl MatchConfig {
    /// Defaults overridden by any `MATCH_*` variables present in the
    /// environment (or a `.env` file). Absent variables keep their default;
    /// unparsable ones are a configuration error.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let base = Self::default();
        Ok(Self {
            default_search_radius_km: env_or("MATCH_DEFAULT_RADIUS_KM", base.default_search_radius_km)?,
            hold_ttl_seconds: env_or("MATCH_HOLD_TTL_SECONDS", base.hold_ttl_seconds)?,
            reputation_half_life_days: env_or(
                "MATCH_REPUTATION_HALF_LIFE_DAYS",
                base.reputation_half_life_days,
            )?,
            reputation_neutral_prior: env_or(
                "MATCH_REPUTATION_NEUTRAL_PRIOR",
                base.reputation_neutral_prior,
            )?,
            weights: Weights {
                w_skill: env_or("MATCH_W_SKILL", base.weights.w_skill)?,
                w_distance: env_or("MATCH_W_DISTANCE", base.weights.w_distance)?,
                w_reputation: env_or("MATCH_W_REPUTATION", base.weights.w_reputation)?,
                w_urgency: env_or("MATCH_W_URGENCY", base.weights.w_urgency)?,
            },
            taxonomy_distance_limit: env_or(
                "MATCH_TAXONOMY_DISTANCE_LIMIT",
                base.taxonomy_distance_limit,
            )?,
            page_size_default: env_or("MATCH_PAGE_SIZE_DEFAULT", base.page_size_default)?,
            page_size_max: env_or("MATCH_PAGE_SIZE_MAX", base.page_size_max)?,
            sweep_interval_seconds: env_or(
                "MATCH_SWEEP_INTERVAL_SECONDS",
                base.sweep_interval_seconds,
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_search_radius_km <= 0.0 {
            return Err(Error::Config("MATCH_DEFAULT_RADIUS_KM must be positive".into()));
        }
        if self.hold_ttl_seconds <= 0 {
            return Err(Error::Config("MATCH_HOLD_TTL_SECONDS must be positive".into()));
        }
        if self.reputation_half_life_days <= 0.0 {
            return Err(Error::Config(
                "MATCH_REPUTATION_HALF_LIFE_DAYS must be positive".into(),
            ));
        }
        if !(0.0..=5.0).contains(&self.reputation_neutral_prior) {
            return Err(Error::Config(
                "MATCH_REPUTATION_NEUTRAL_PRIOR must be within 0.0..=5.0".into(),
            ));
        }
        let w = &self.weights;
        if [w.w_skill, w.w_distance, w.w_reputation, w.w_urgency]
            .iter()
            .any(|v| *v < 0.0)
        {
            return Err(Error::Config("score weights must be non-negative".into()));
        }
        if self.page_size_default == 0 || self.page_size_max == 0 {
            return Err(Error::Config("page sizes must be positive".into()));
        }
        if self.page_size_default > self.page_size_max {
            return Err(Error::Config(
                "MATCH_PAGE_SIZE_DEFAULT cannot exceed MATCH_PAGE_SIZE_MAX".into(),
            ));
        }
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
