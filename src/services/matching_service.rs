use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchConfig;
use crate::dto::snapshot_dto::{RebuildReport, Snapshot};
use crate::dto::upsert_dto::{PostJobPayload, RateCompletionPayload, UpsertWorkerPayload};
use crate::error::{Error, Result};
use crate::models::availability::{AvailabilityWindow, CandidateHold};
use crate::models::job::{JobPosting, JobStatus, UrgencyTier};
use crate::models::match_result::{MatchCandidate, MatchPage, ScoreBreakdown};
use crate::models::skill::{SkillClaim, SkillId};
use crate::models::worker::{GeoPoint, WorkerProfile};
use crate::services::availability_service::AvailabilityLedger;
use crate::services::geo_service::GeoIndex;
use crate::services::reputation_service::ReputationAggregator;
use crate::services::taxonomy_service::SkillTaxonomy;
use crate::utils::time::Clock;
use crate::utils::validation::{valid_latitude, valid_longitude, validate};

/// Booking receipt kept per matched job so completion knows which worker and
/// window to settle.
#[derive(Debug, Clone, Copy)]
struct Assignment {
    worker_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// The orchestrator: owns the worker/job registries and both geo-indexes,
/// fans out to taxonomy, ledger and reputation, and combines the pieces into
/// ranked, explained, paginated results.
///
/// Lock order, where more than one is taken: registry -> calendar.
pub struct MatchingService {
    config: MatchConfig,
    taxonomy: Arc<SkillTaxonomy>,
    ledger: Arc<AvailabilityLedger>,
    reputation: Arc<ReputationAggregator>,
    clock: Arc<dyn Clock>,
    worker_geo: GeoIndex,
    job_geo: GeoIndex,
    workers: RwLock<HashMap<Uuid, WorkerProfile>>,
    jobs: RwLock<HashMap<Uuid, JobPosting>>,
    assignments: RwLock<HashMap<Uuid, Assignment>>,
}

impl MatchingService {
    pub fn new(
        config: MatchConfig,
        taxonomy: Arc<SkillTaxonomy>,
        ledger: Arc<AvailabilityLedger>,
        reputation: Arc<ReputationAggregator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            taxonomy,
            ledger,
            reputation,
            clock,
            worker_geo: GeoIndex::new("workers"),
            job_geo: GeoIndex::new("open-jobs"),
            workers: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
        }
    }

    // ---- profile / job upsert hooks -------------------------------------

    /// Register or update a worker. Claimed skills arrive as free text and
    /// leave canonical; anything unresolvable fails the whole upsert.
    pub fn upsert_worker(&self, payload: UpsertWorkerPayload) -> Result<WorkerProfile> {
        validate(&payload)?;

        let mut claims = Vec::with_capacity(payload.skills.len());
        for claim in &payload.skills {
            let skill = self.taxonomy.resolve(&claim.skill)?;
            claims.push(SkillClaim {
                skill: skill.id,
                proficiency: claim.proficiency,
            });
        }

        let now = self.clock.now();
        let home = GeoPoint::new(payload.latitude, payload.longitude);
        let id = payload.id.unwrap_or_else(Uuid::new_v4);

        let profile = {
            let mut workers = write_guard(&self.workers, "worker registry")?;
            let created_at = workers.get(&id).map(|w| w.created_at).unwrap_or(now);
            let profile = WorkerProfile {
                id,
                name: payload.name,
                skills: claims,
                home,
                service_radius_km: payload.service_radius_km,
                active: payload.active,
                created_at,
                updated_at: now,
            };
            workers.insert(id, profile.clone());
            profile
        };

        if profile.active {
            self.worker_geo.upsert(id, home)?;
        } else {
            self.worker_geo.remove(id)?;
        }
        info!(worker_id = %id, active = profile.active, "worker profile upserted");
        Ok(profile)
    }

    pub fn deactivate_worker(&self, id: Uuid) -> Result<()> {
        {
            let mut workers = write_guard(&self.workers, "worker registry")?;
            let worker = workers
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("worker", id))?;
            worker.active = false;
            worker.updated_at = self.clock.now();
        }
        self.worker_geo.remove(id)?;
        Ok(())
    }

    pub fn remove_worker(&self, id: Uuid) -> Result<()> {
        let removed = write_guard(&self.workers, "worker registry")?.remove(&id);
        if removed.is_none() {
            return Err(Error::not_found("worker", id));
        }
        self.worker_geo.remove(id)?;
        Ok(())
    }

    pub fn get_worker(&self, id: Uuid) -> Result<WorkerProfile> {
        read_guard(&self.workers, "worker registry")?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("worker", id))
    }

    /// Post a new job. The required skill resolves at this boundary; an
    /// unknown skill never reaches the open pool.
    pub fn post_job(&self, payload: PostJobPayload) -> Result<JobPosting> {
        validate(&payload)?;
        let skill = self.taxonomy.resolve(&payload.required_skill)?;
        let location = GeoPoint::new(payload.latitude, payload.longitude);

        let job = JobPosting {
            id: Uuid::new_v4(),
            employer_id: payload.employer_id,
            title: payload.title,
            required_skill: skill.id,
            min_proficiency: payload.min_proficiency,
            location,
            budget_min: payload.budget_min,
            budget_max: payload.budget_max,
            urgency: payload.urgency,
            duration_minutes: payload.duration_minutes,
            posted_at: payload.posted_at.unwrap_or_else(|| self.clock.now()),
            status: JobStatus::Open,
        };

        write_guard(&self.jobs, "job registry")?.insert(job.id, job.clone());
        self.job_geo.upsert(job.id, location)?;
        info!(job_id = %job.id, skill = %job.required_skill, "job posted");
        Ok(job)
    }

    pub fn cancel_job(&self, id: Uuid) -> Result<()> {
        {
            let mut jobs = write_guard(&self.jobs, "job registry")?;
            let job = jobs.get_mut(&id).ok_or_else(|| Error::not_found("job", id))?;
            if job.status == JobStatus::Completed {
                return Err(Error::conflict(id, "completed job cannot be cancelled"));
            }
            job.status = JobStatus::Cancelled;
        }
        self.job_geo.remove(id)?;
        Ok(())
    }

    pub fn get_job(&self, id: Uuid) -> Result<JobPosting> {
        read_guard(&self.jobs, "job registry")?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("job", id))
    }

    // ---- ranking --------------------------------------------------------

    /// Ranked workers for an open job. Composite score per candidate, plus
    /// the sub-scores that produced it; fully deterministic ordering.
    pub fn match_workers_for_job(
        &self,
        job_id: Uuid,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<MatchPage> {
        let job = self.get_job(job_id)?;
        let (page, page_size) = self.page_bounds(page, page_size);
        if !job.is_open() {
            debug!(%job_id, status = ?job.status, "match request for non-open job");
            return Ok(MatchPage::empty(page, page_size));
        }
        // Fail fast if the taxonomy no longer resolves the job's skill; a
        // silent empty result would hide a data problem.
        let required = self.taxonomy.resolve(job.required_skill.as_str())?;

        let radius = self.config.default_search_radius_km;
        let hits = self.worker_geo.query(job.location, radius)?;

        let mut candidates = Vec::new();
        {
            let workers = read_guard(&self.workers, "worker registry")?;
            for (worker_id, distance_km) in hits {
                let Some(worker) = workers.get(&worker_id) else {
                    continue;
                };
                if !worker.active || distance_km > worker.service_radius_km {
                    continue;
                }
                let Some((skill_score, hops)) =
                    self.best_claim(&worker.skills, &required.id, job.min_proficiency)?
                else {
                    continue;
                };
                let fitness =
                    self.ledger
                        .fitness(worker_id, job.posted_at, job.duration())?;
                if job.urgency == UrgencyTier::Emergency && fitness == 0.0 {
                    continue;
                }
                candidates.push(self.scored(
                    worker_id,
                    skill_score,
                    hops,
                    distance_km,
                    radius,
                    self.reputation.score_of(worker_id)?,
                    fitness,
                ));
            }
        }

        Ok(self.ranked_page(candidates, page, page_size))
    }

    /// Symmetric direction: ranked open jobs for an active worker, bounded
    /// by the worker's own service radius.
    pub fn match_jobs_for_worker(
        &self,
        worker_id: Uuid,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<MatchPage> {
        let worker = self.get_worker(worker_id)?;
        let (page, page_size) = self.page_bounds(page, page_size);
        if !worker.active {
            return Ok(MatchPage::empty(page, page_size));
        }

        let radius = worker.service_radius_km;
        let hits = self.job_geo.query(worker.home, radius)?;

        let mut candidates = Vec::new();
        {
            let jobs = read_guard(&self.jobs, "job registry")?;
            for (job_id, distance_km) in hits {
                let Some(job) = jobs.get(&job_id) else {
                    continue;
                };
                if !job.is_open() {
                    continue;
                }
                let Some((skill_score, hops)) =
                    self.best_claim(&worker.skills, &job.required_skill, job.min_proficiency)?
                else {
                    continue;
                };
                let fitness =
                    self.ledger
                        .fitness(worker_id, job.posted_at, job.duration())?;
                if job.urgency == UrgencyTier::Emergency && fitness == 0.0 {
                    continue;
                }
                candidates.push(self.scored(
                    job_id,
                    skill_score,
                    hops,
                    distance_km,
                    radius,
                    self.reputation.score_of(worker_id)?,
                    fitness,
                ));
            }
        }

        Ok(self.ranked_page(candidates, page, page_size))
    }

    // ---- hold / confirm / release / complete ----------------------------

    /// Employer picks a worker: reserve the earliest fitting slot. A
    /// `Conflict` here means "offer the next candidate", nothing worse.
    pub fn commit_match(&self, job_id: Uuid, worker_id: Uuid) -> Result<CandidateHold> {
        let job = self.get_job(job_id)?;
        if !job.is_open() {
            return Err(Error::conflict(worker_id, "job is no longer open"));
        }
        // Validate the worker exists and is still active before touching
        // the calendar.
        let worker = self.get_worker(worker_id)?;
        if !worker.active {
            return Err(Error::conflict(worker_id, "worker is inactive"));
        }

        let slot = self
            .ledger
            .find_slot(worker_id, job.posted_at, job.duration())?
            .ok_or_else(|| Error::conflict(worker_id, "no fitting availability window"))?;

        let hold = self.ledger.hold(worker_id, job_id, slot.0, slot.1)?;
        debug!(%job_id, %worker_id, hold_id = %hold.id, "candidate held");
        Ok(hold)
    }

    /// Mutual confirmation: the held window books, the job leaves the open
    /// pool. An expired hold fails here and the caller must re-query.
    pub fn confirm_match(&self, hold: &CandidateHold) -> Result<AvailabilityWindow> {
        let mut jobs = write_guard(&self.jobs, "job registry")?;
        let job = jobs
            .get_mut(&hold.job_id)
            .ok_or_else(|| Error::not_found("job", hold.job_id))?;
        if !job.is_open() {
            // The job went away mid-negotiation; give the window back.
            self.ledger.release(hold)?;
            return Err(Error::conflict(hold.worker_id, "job is no longer open"));
        }

        let window = self.ledger.confirm(hold)?;
        job.status = JobStatus::Matched;
        drop(jobs);

        self.job_geo.remove(hold.job_id)?;
        write_guard(&self.assignments, "assignment registry")?.insert(
            hold.job_id,
            Assignment {
                worker_id: hold.worker_id,
                start: window.start,
                end: window.end,
            },
        );
        info!(job_id = %hold.job_id, worker_id = %hold.worker_id, "match confirmed");
        Ok(window)
    }

    /// Rejection: the window frees immediately; the job never left the open
    /// pool, so it is re-matchable with no further action from the caller.
    pub fn release_match(&self, hold: &CandidateHold) -> Result<()> {
        self.ledger.release(hold)
    }

    /// Work done: the booked window frees, the job completes, and the
    /// optional rating feeds the reputation aggregator.
    pub fn complete_match(&self, job_id: Uuid, rating: Option<u8>) -> Result<()> {
        let assignment = write_guard(&self.assignments, "assignment registry")?
            .remove(&job_id)
            .ok_or_else(|| Error::not_found("assignment", job_id))?;

        self.ledger
            .complete(assignment.worker_id, assignment.start, assignment.end)?;
        {
            let mut jobs = write_guard(&self.jobs, "job registry")?;
            if let Some(job) = jobs.get_mut(&job_id) {
                job.status = JobStatus::Completed;
            }
        }
        if let Some(rating) = rating {
            self.reputation
                .record(assignment.worker_id, rating, self.clock.now())?;
        }
        info!(%job_id, worker_id = %assignment.worker_id, "match completed");
        Ok(())
    }

    /// Late feedback on an already-completed job. Ratings append; history is
    /// never edited.
    pub fn rate_completion(&self, payload: RateCompletionPayload) -> Result<()> {
        validate(&payload)?;
        // The worker must at least be known to the registry.
        let _ = self.get_worker(payload.worker_id)?;
        let completed_at = payload.completed_at.unwrap_or_else(|| self.clock.now());
        self.reputation
            .record(payload.worker_id, payload.rating, completed_at)
    }

    // ---- snapshot / lifecycle -------------------------------------------

    /// Cold start from the storage collaborator. Entities whose skills no
    /// longer resolve are skipped with a warning instead of failing the
    /// whole load.
    pub fn rebuild_from_snapshot(&self, snapshot: Snapshot) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();

        {
            let mut workers = write_guard(&self.workers, "worker registry")?;
            let mut jobs = write_guard(&self.jobs, "job registry")?;
            workers.clear();
            jobs.clear();
            self.worker_geo.clear()?;
            self.job_geo.clear()?;
            self.ledger.clear()?;
            write_guard(&self.assignments, "assignment registry")?.clear();

            for worker in snapshot.workers {
                if let Some(bad) = worker
                    .skills
                    .iter()
                    .find(|c| !self.taxonomy.contains(&c.skill))
                {
                    warn!(worker_id = %worker.id, skill = %bad.skill, "skipping worker with unresolvable skill");
                    report.skipped += 1;
                    continue;
                }
                if !valid_latitude(worker.home.latitude) || !valid_longitude(worker.home.longitude)
                {
                    warn!(worker_id = %worker.id, "skipping worker with out-of-range coordinates");
                    report.skipped += 1;
                    continue;
                }
                if worker.active {
                    self.worker_geo.upsert(worker.id, worker.home)?;
                }
                workers.insert(worker.id, worker);
                report.workers += 1;
            }

            for job in snapshot.jobs {
                if !self.taxonomy.contains(&job.required_skill) {
                    warn!(job_id = %job.id, skill = %job.required_skill, "skipping job with unresolvable skill");
                    report.skipped += 1;
                    continue;
                }
                if !valid_latitude(job.location.latitude) || !valid_longitude(job.location.longitude)
                {
                    warn!(job_id = %job.id, "skipping job with out-of-range coordinates");
                    report.skipped += 1;
                    continue;
                }
                if job.is_open() {
                    self.job_geo.upsert(job.id, job.location)?;
                }
                jobs.insert(job.id, job);
                report.jobs += 1;
            }
        }

        for window in snapshot.availability_windows {
            match self.ledger.restore_window(window) {
                Ok(()) => report.windows += 1,
                Err(e) => {
                    warn!(error = %e, "skipping snapshot window");
                    report.skipped += 1;
                }
            }
        }

        report.rated_workers = self.reputation.rebuild(&snapshot.ratings)?;
        info!(
            workers = report.workers,
            jobs = report.jobs,
            windows = report.windows,
            skipped = report.skipped,
            "rebuilt from snapshot"
        );
        Ok(report)
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    // ---- internals ------------------------------------------------------

    /// Best eligible claim for a required skill: proficiency must meet the
    /// minimum and the claim must sit within the configured taxonomy
    /// distance of the requirement. Returns the attenuated skill sub-score
    /// and the hops used, or None when nothing qualifies.
    fn best_claim(
        &self,
        claims: &[SkillClaim],
        required: &SkillId,
        min_proficiency: u8,
    ) -> Result<Option<(f64, u32)>> {
        let limit = self.config.taxonomy_distance_limit;
        let mut best: Option<(f64, u32)> = None;
        for claim in claims {
            if claim.proficiency < min_proficiency {
                continue;
            }
            let Some(hops) = self.taxonomy.taxonomy_distance(&claim.skill, required)? else {
                continue;
            };
            if hops > limit {
                continue;
            }
            let affinity = 1.0 - f64::from(hops) / f64::from(limit + 1);
            let score = f64::from(claim.proficiency) / 5.0 * affinity;
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, hops));
            }
        }
        Ok(best)
    }

    #[allow(clippy::too_many_arguments)]
    fn scored(
        &self,
        id: Uuid,
        skill_score: f64,
        hops: u32,
        distance_km: f64,
        radius_km: f64,
        reputation: f64,
        fitness: f64,
    ) -> MatchCandidate {
        let w = &self.config.weights;
        let distance_score = (1.0 - distance_km / radius_km).max(0.0);
        let reputation_score = reputation / 5.0;
        let score = w.w_skill * skill_score
            + w.w_distance * distance_score
            + w.w_reputation * reputation_score
            + w.w_urgency * fitness;
        MatchCandidate {
            id,
            score,
            breakdown: ScoreBreakdown {
                skill: skill_score,
                distance: distance_score,
                reputation: reputation_score,
                availability: fitness,
                taxonomy_distance: hops,
                distance_km,
            },
        }
    }

    /// Sort by score descending, ties by ascending distance then id, then
    /// cut the requested page. Identical inputs always produce identical
    /// pages.
    fn ranked_page(
        &self,
        mut candidates: Vec<MatchCandidate>,
        page: usize,
        page_size: usize,
    ) -> MatchPage {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.breakdown
                        .distance_km
                        .partial_cmp(&b.breakdown.distance_km)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = candidates.len();
        let items = candidates
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        MatchPage {
            items,
            page,
            page_size,
            total,
        }
    }

    fn page_bounds(&self, page: usize, page_size: Option<usize>) -> (usize, usize) {
        let page = page.max(1);
        let size = page_size
            .unwrap_or(self.config.page_size_default)
            .clamp(1, self.config.page_size_max);
        (page, size)
    }
}

fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> Result<std::sync::RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| Error::Transient { context })
}

fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> Result<std::sync::RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| Error::Transient { context })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skill::Skill;
    use crate::utils::time::{from_rfc3339, ManualClock};

    fn service() -> (Arc<MatchingService>, ManualClock) {
        let clock = ManualClock::new(from_rfc3339("2025-06-01T08:00:00Z").unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let taxonomy = Arc::new(
            SkillTaxonomy::with_skills([
                Skill::new("electrical-work", "Electrical Work"),
                Skill::new("residential-wiring", "Residential Electrical Wiring")
                    .with_parent("electrical-work"),
                Skill::new("plumbing", "Plumbing").with_synonyms(["pipe fitting"]),
            ])
            .unwrap(),
        );
        let config = MatchConfig::default();
        let ledger = Arc::new(AvailabilityLedger::new(
            Arc::clone(&shared),
            config.hold_ttl_seconds,
        ));
        let reputation = Arc::new(ReputationAggregator::new(
            Arc::clone(&shared),
            config.reputation_half_life_days,
            config.reputation_neutral_prior,
        ));
        (
            Arc::new(MatchingService::new(
                config, taxonomy, ledger, reputation, shared,
            )),
            clock,
        )
    }

    fn worker_payload(name: &str, skill: &str, proficiency: u8) -> UpsertWorkerPayload {
        UpsertWorkerPayload {
            id: None,
            name: name.into(),
            skills: vec![crate::dto::upsert_dto::SkillClaimPayload {
                skill: skill.into(),
                proficiency,
            }],
            latitude: 12.97,
            longitude: 77.59,
            service_radius_km: 30.0,
            active: true,
        }
    }

    fn job_payload(skill: &str, min_proficiency: u8) -> PostJobPayload {
        PostJobPayload {
            employer_id: Uuid::from_u128(999),
            title: "Fix kitchen sink".into(),
            required_skill: skill.into(),
            min_proficiency,
            latitude: 12.98,
            longitude: 77.60,
            budget_min: None,
            budget_max: None,
            urgency: UrgencyTier::Standard,
            duration_minutes: 120,
            posted_at: Some(from_rfc3339("2025-06-01T08:00:00Z").unwrap()),
        }
    }

    #[test]
    fn upsert_rejects_unknown_skill() {
        let (svc, _) = service();
        let err = svc
            .upsert_worker(worker_payload("W", "quantum plumbing", 4))
            .unwrap_err();
        assert!(matches!(err, Error::SkillNotFound { .. }));
    }

    #[test]
    fn free_text_claims_become_canonical() {
        let (svc, _) = service();
        let profile = svc
            .upsert_worker(worker_payload("W", "Pipe Fitting", 4))
            .unwrap();
        assert_eq!(profile.skills[0].skill, SkillId::new("plumbing"));
    }

    #[test]
    fn proficiency_below_minimum_is_excluded() {
        let (svc, _) = service();
        svc.upsert_worker(worker_payload("Weak", "plumbing", 2))
            .unwrap();
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();
        let page = svc.match_workers_for_job(job.id, 1, None).unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn descendant_skill_partially_satisfies_parent_requirement() {
        let (svc, _) = service();
        let exact = svc
            .upsert_worker(worker_payload("Exact", "electrical-work", 4))
            .unwrap();
        let related = svc
            .upsert_worker(worker_payload("Related", "residential-wiring", 4))
            .unwrap();
        let job = svc.post_job(job_payload("electrical-work", 3)).unwrap();

        let page = svc.match_workers_for_job(job.id, 1, None).unwrap();
        assert_eq!(page.total, 2);
        let exact_hit = page.items.iter().find(|c| c.id == exact.id).unwrap();
        let related_hit = page.items.iter().find(|c| c.id == related.id).unwrap();
        assert_eq!(exact_hit.breakdown.taxonomy_distance, 0);
        assert_eq!(related_hit.breakdown.taxonomy_distance, 1);
        assert!(exact_hit.breakdown.skill > related_hit.breakdown.skill);
    }

    #[test]
    fn emergency_excludes_workers_with_no_fit() {
        let (svc, _) = service();
        let idle = svc
            .upsert_worker(worker_payload("NoWindows", "plumbing", 5))
            .unwrap();

        let mut payload = job_payload("plumbing", 3);
        payload.urgency = UrgencyTier::Emergency;
        let emergency = svc.post_job(payload).unwrap();
        let standard = svc.post_job(job_payload("plumbing", 3)).unwrap();

        assert!(svc
            .match_workers_for_job(emergency.id, 1, None)
            .unwrap()
            .items
            .is_empty());
        let page = svc.match_workers_for_job(standard.id, 1, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, idle.id);
        assert_eq!(page.items[0].breakdown.availability, 0.0);
    }

    #[test]
    fn ranking_is_monotonic_and_paginated_without_gaps() {
        let (svc, _) = service();
        for n in 0..7 {
            let mut p = worker_payload(&format!("W{}", n), "plumbing", 3 + (n % 3) as u8);
            p.latitude += f64::from(n) * 0.01;
            svc.upsert_worker(p).unwrap();
        }
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();

        let all = svc.match_workers_for_job(job.id, 1, Some(100)).unwrap();
        assert_eq!(all.total, 7);
        assert!(all
            .items
            .windows(2)
            .all(|w| w[0].score >= w[1].score));

        let first = svc.match_workers_for_job(job.id, 1, Some(3)).unwrap();
        let second = svc.match_workers_for_job(job.id, 2, Some(3)).unwrap();
        let third = svc.match_workers_for_job(job.id, 3, Some(3)).unwrap();
        let stitched: Vec<Uuid> = first
            .items
            .iter()
            .chain(&second.items)
            .chain(&third.items)
            .map(|c| c.id)
            .collect();
        let full: Vec<Uuid> = all.items.iter().map(|c| c.id).collect();
        assert_eq!(stitched, full);
    }

    #[test]
    fn worker_service_radius_is_respected() {
        let (svc, _) = service();
        let mut homebody = worker_payload("Homebody", "plumbing", 4);
        homebody.service_radius_km = 1.0; // job is ~1.6 km away
        svc.upsert_worker(homebody).unwrap();
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();
        assert!(svc
            .match_workers_for_job(job.id, 1, None)
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn jobs_for_worker_mirrors_job_side_filters() {
        let (svc, _) = service();
        let worker = svc
            .upsert_worker(worker_payload("W", "plumbing", 4))
            .unwrap();
        let plumbing = svc.post_job(job_payload("plumbing", 3)).unwrap();
        svc.post_job(job_payload("electrical-work", 3)).unwrap();

        let page = svc.match_jobs_for_worker(worker.id, 1, None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, plumbing.id);
    }

    #[test]
    fn confirmed_job_leaves_the_open_pool() {
        let (svc, _) = service();
        let worker = svc
            .upsert_worker(worker_payload("W", "plumbing", 4))
            .unwrap();
        svc.ledger
            .declare_window(
                worker.id,
                from_rfc3339("2025-06-01T09:00:00Z").unwrap(),
                from_rfc3339("2025-06-01T17:00:00Z").unwrap(),
            )
            .unwrap();
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();

        let hold = svc.commit_match(job.id, worker.id).unwrap();
        svc.confirm_match(&hold).unwrap();

        assert_eq!(svc.get_job(job.id).unwrap().status, JobStatus::Matched);
        assert!(svc
            .match_jobs_for_worker(worker.id, 1, None)
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn complete_match_books_reputation() {
        let (svc, _) = service();
        let worker = svc
            .upsert_worker(worker_payload("W", "plumbing", 4))
            .unwrap();
        svc.ledger
            .declare_window(
                worker.id,
                from_rfc3339("2025-06-01T09:00:00Z").unwrap(),
                from_rfc3339("2025-06-01T17:00:00Z").unwrap(),
            )
            .unwrap();
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();
        let hold = svc.commit_match(job.id, worker.id).unwrap();
        svc.confirm_match(&hold).unwrap();

        svc.complete_match(job.id, Some(5)).unwrap();
        assert_eq!(svc.get_job(job.id).unwrap().status, JobStatus::Completed);
        assert_eq!(svc.reputation.score_of(worker.id).unwrap(), 5.0);
        // The booked slot is free again.
        assert!(svc
            .ledger
            .is_free(
                worker.id,
                from_rfc3339("2025-06-01T09:00:00Z").unwrap(),
                from_rfc3339("2025-06-01T11:00:00Z").unwrap(),
            )
            .unwrap());
    }

    #[test]
    fn released_job_is_rematchable_without_caller_action() {
        let (svc, _) = service();
        let worker = svc
            .upsert_worker(worker_payload("W", "plumbing", 4))
            .unwrap();
        svc.ledger
            .declare_window(
                worker.id,
                from_rfc3339("2025-06-01T09:00:00Z").unwrap(),
                from_rfc3339("2025-06-01T17:00:00Z").unwrap(),
            )
            .unwrap();
        let job = svc.post_job(job_payload("plumbing", 3)).unwrap();

        let hold = svc.commit_match(job.id, worker.id).unwrap();
        svc.release_match(&hold).unwrap();

        assert_eq!(svc.get_job(job.id).unwrap().status, JobStatus::Open);
        // Same worker can be held again right away.
        let again = svc.commit_match(job.id, worker.id).unwrap();
        assert_eq!(again.start, hold.start);
    }

    #[test]
    fn late_rating_validates_and_appends() {
        let (svc, _) = service();
        let worker = svc
            .upsert_worker(worker_payload("W", "plumbing", 4))
            .unwrap();

        let err = svc
            .rate_completion(RateCompletionPayload {
                worker_id: worker.id,
                rating: 9,
                completed_at: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        svc.rate_completion(RateCompletionPayload {
            worker_id: worker.id,
            rating: 4,
            completed_at: None,
        })
        .unwrap();
        assert_eq!(svc.reputation.score_of(worker.id).unwrap(), 4.0);
    }

    #[test]
    fn match_on_unknown_job_is_not_found() {
        let (svc, _) = service();
        let err = svc
            .match_workers_for_job(Uuid::from_u128(42), 1, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
