use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::reputation::{RatingSample, ReputationRecord};
use crate::utils::time::Clock;

#[derive(Debug, Default)]
struct History {
    samples: Vec<RatingSample>,
    /// Invalidated on every append. The decayed weighted mean does not
    /// depend on when it is evaluated (the common decay factor cancels),
    /// so caching it is exact, not approximate.
    cached_score: Option<f64>,
}

/// Rolling reputation per worker: an exponentially decayed weighted average
/// of completed-job ratings, more recent ratings weighing more. Ratings are
/// append-only; there is no operation that edits history.
pub struct ReputationAggregator {
    histories: RwLock<HashMap<Uuid, History>>,
    clock: Arc<dyn Clock>,
    /// exp decay constant, ln 2 / half-life-days
    lambda: f64,
    neutral_prior: f64,
}

impl ReputationAggregator {
    pub fn new(clock: Arc<dyn Clock>, half_life_days: f64, neutral_prior: f64) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            clock,
            lambda: std::f64::consts::LN_2 / half_life_days,
            neutral_prior,
        }
    }

    pub fn record(&self, worker_id: Uuid, rating: u8, completed_at: DateTime<Utc>) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(Error::Config(format!(
                "rating must be 1..=5, got {}",
                rating
            )));
        }
        let mut histories = self.write()?;
        let history = histories.entry(worker_id).or_default();
        history.samples.push(RatingSample {
            rating,
            completed_at,
        });
        history.cached_score = None;
        debug!(%worker_id, rating, "rating recorded");
        Ok(())
    }

    /// Decayed rolling average, or the neutral prior for unrated workers so
    /// newcomers are not starved of matches.
    pub fn score_of(&self, worker_id: Uuid) -> Result<f64> {
        {
            let histories = self.read()?;
            match histories.get(&worker_id) {
                None => return Ok(self.neutral_prior),
                Some(h) if h.samples.is_empty() => return Ok(self.neutral_prior),
                Some(h) => {
                    if let Some(score) = h.cached_score {
                        return Ok(score);
                    }
                }
            }
        }

        let mut histories = self.write()?;
        let Some(history) = histories.get_mut(&worker_id) else {
            return Ok(self.neutral_prior);
        };
        let score = decayed_mean(&history.samples, self.lambda);
        history.cached_score = Some(score);
        Ok(score)
    }

    pub fn sample_count(&self, worker_id: Uuid) -> Result<usize> {
        Ok(self
            .read()?
            .get(&worker_id)
            .map(|h| h.samples.len())
            .unwrap_or(0))
    }

    /// Export for the storage collaborator.
    pub fn snapshot(&self) -> Result<Vec<ReputationRecord>> {
        let now = self.clock.now();
        let histories = self.read()?;
        let mut records: Vec<ReputationRecord> = histories
            .iter()
            .filter(|(_, h)| !h.samples.is_empty())
            .map(|(worker_id, h)| ReputationRecord {
                worker_id: *worker_id,
                score: h
                    .cached_score
                    .unwrap_or_else(|| decayed_mean(&h.samples, self.lambda)),
                sample_count: h.samples.len(),
                last_updated: now,
            })
            .collect();
        records.sort_by_key(|r| r.worker_id);
        Ok(records)
    }

    pub fn rebuild(&self, ratings: &[(Uuid, Vec<RatingSample>)]) -> Result<usize> {
        let mut histories = self.write()?;
        histories.clear();
        for (worker_id, samples) in ratings {
            let history = histories.entry(*worker_id).or_default();
            history.samples.extend(samples.iter().copied());
            history.samples.sort_by_key(|s| s.completed_at);
            history.cached_score = None;
        }
        Ok(histories.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, History>>> {
        self.histories.read().map_err(|_| Error::Transient {
            context: "reputation store lock poisoned",
        })
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, History>>> {
        self.histories.write().map_err(|_| Error::Transient {
            context: "reputation store lock poisoned",
        })
    }
}

/// Weighted mean with weight `exp(-λ · age_days)`, ages measured from the
/// newest sample so the exponents stay small.
fn decayed_mean(samples: &[RatingSample], lambda: f64) -> f64 {
    let newest = samples
        .iter()
        .map(|s| s.completed_at)
        .max()
        .expect("decayed_mean called with samples");

    let mut weight_sum = 0.0;
    let mut weighted = 0.0;
    for s in samples {
        let age_days = (newest - s.completed_at).num_seconds() as f64 / 86_400.0;
        let w = (-lambda * age_days).exp();
        weight_sum += w;
        weighted += w * f64::from(s.rating);
    }
    (weighted / weight_sum).clamp(0.0, 5.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::{from_rfc3339, ManualClock};
    use chrono::Duration;

    fn aggregator() -> (ReputationAggregator, ManualClock) {
        let clock = ManualClock::new(from_rfc3339("2025-06-01T00:00:00Z").unwrap());
        let agg = ReputationAggregator::new(Arc::new(clock.clone()), 90.0, 3.0);
        (agg, clock)
    }

    #[test]
    fn unrated_worker_gets_neutral_prior() {
        let (agg, _) = aggregator();
        assert_eq!(agg.score_of(Uuid::from_u128(1)).unwrap(), 3.0);
    }

    #[test]
    fn recent_ratings_weigh_more() {
        let (agg, clock) = aggregator();
        let w = Uuid::from_u128(1);
        let old = clock.now() - Duration::days(180);
        agg.record(w, 5, old).unwrap();
        agg.record(w, 1, clock.now()).unwrap();

        // Equal magnitudes would average to 3.0; the newer 1-star dominates.
        let score = agg.score_of(w).unwrap();
        assert!(score < 3.0, "got {}", score);

        // Mirror-image history leans the other way by the same margin.
        let w2 = Uuid::from_u128(2);
        agg.record(w2, 1, old).unwrap();
        agg.record(w2, 5, clock.now()).unwrap();
        let score2 = agg.score_of(w2).unwrap();
        assert!(score2 > 3.0);
        assert!((score + score2 - 6.0).abs() < 1e-9);
    }

    #[test]
    fn single_rating_is_exact() {
        let (agg, clock) = aggregator();
        let w = Uuid::from_u128(1);
        agg.record(w, 4, clock.now()).unwrap();
        assert!((agg.score_of(w).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn cache_invalidates_on_append() {
        let (agg, clock) = aggregator();
        let w = Uuid::from_u128(1);
        agg.record(w, 5, clock.now()).unwrap();
        assert!((agg.score_of(w).unwrap() - 5.0).abs() < 1e-12);

        agg.record(w, 1, clock.now()).unwrap();
        let score = agg.score_of(w).unwrap();
        assert!((score - 3.0).abs() < 1e-12, "got {}", score);
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let (agg, clock) = aggregator();
        assert!(agg.record(Uuid::from_u128(1), 0, clock.now()).is_err());
        assert!(agg.record(Uuid::from_u128(1), 6, clock.now()).is_err());
    }

    #[test]
    fn snapshot_round_trips_through_rebuild() {
        let (agg, clock) = aggregator();
        let w = Uuid::from_u128(1);
        agg.record(w, 4, clock.now() - Duration::days(10)).unwrap();
        agg.record(w, 5, clock.now()).unwrap();
        let before = agg.score_of(w).unwrap();

        let ratings = vec![(
            w,
            vec![
                RatingSample {
                    rating: 4,
                    completed_at: clock.now() - Duration::days(10),
                },
                RatingSample {
                    rating: 5,
                    completed_at: clock.now(),
                },
            ],
        )];
        let (fresh, _) = aggregator();
        fresh.rebuild(&ratings).unwrap();
        assert!((fresh.score_of(w).unwrap() - before).abs() < 1e-12);
        assert_eq!(fresh.snapshot().unwrap()[0].sample_count, 2);
    }
}
