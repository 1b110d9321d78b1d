pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::MatchConfig;
use crate::dto::snapshot_dto::{RebuildReport, Snapshot};
use crate::error::Result;
use crate::services::availability_service::AvailabilityLedger;
use crate::services::matching_service::MatchingService;
use crate::services::reputation_service::ReputationAggregator;
use crate::services::taxonomy_service::SkillTaxonomy;
use crate::utils::time::{Clock, SystemClock};

/// The assembled matching core. The external API layer constructs one of
/// these at startup, feeds it profile/job upserts, and calls the matcher's
/// query and hold operations; everything else stays internal.
pub struct Engine {
    pub taxonomy: Arc<SkillTaxonomy>,
    pub ledger: Arc<AvailabilityLedger>,
    pub reputation: Arc<ReputationAggregator>,
    pub matcher: Arc<MatchingService>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
    sweep_interval_seconds: u64,
}

impl Engine {
    pub fn new(config: MatchConfig, taxonomy: SkillTaxonomy) -> Result<Self> {
        Self::with_clock(config, taxonomy, Arc::new(SystemClock))
    }

    /// Same wiring with an injected clock; tests drive a manual one.
    pub fn with_clock(
        config: MatchConfig,
        taxonomy: SkillTaxonomy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let taxonomy = Arc::new(taxonomy);
        let ledger = Arc::new(AvailabilityLedger::new(
            Arc::clone(&clock),
            config.hold_ttl_seconds,
        ));
        let reputation = Arc::new(ReputationAggregator::new(
            Arc::clone(&clock),
            config.reputation_half_life_days,
            config.reputation_neutral_prior,
        ));
        let sweep_interval_seconds = config.sweep_interval_seconds;
        let matcher = Arc::new(MatchingService::new(
            config,
            Arc::clone(&taxonomy),
            Arc::clone(&ledger),
            Arc::clone(&reputation),
            clock,
        ));

        Ok(Self {
            taxonomy,
            ledger,
            reputation,
            matcher,
            sweeper: Mutex::new(None),
            sweep_interval_seconds,
        })
    }

    /// Load persisted state at startup.
    pub fn rebuild_from_snapshot(&self, snapshot: Snapshot) -> Result<RebuildReport> {
        self.matcher.rebuild_from_snapshot(snapshot)
    }

    /// Start the periodic reaper for abandoned holds. Expiry is also checked
    /// lazily on access, so running without the sweeper is correct, just
    /// less tidy.
    pub fn spawn_hold_sweeper(&self) {
        let mut guard = self.sweeper.lock().expect("sweeper handle mutex poisoned");
        if guard.is_none() {
            *guard = Some(self.ledger.spawn_sweeper(self.sweep_interval_seconds));
        }
    }

    /// Graceful drain: new holds are rejected, in-flight holds may still
    /// confirm, release, or expire; queries keep working.
    pub fn shutdown(&self) {
        self.ledger.begin_drain();
        let mut guard = self.sweeper.lock().expect("sweeper handle mutex poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        info!("matching engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
