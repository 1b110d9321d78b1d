use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::availability::{AvailabilityWindow, CandidateHold, WindowState};
use crate::utils::time::Clock;
use crate::utils::validation::valid_interval;

/// One worker's calendar: non-overlapping windows sorted by start time.
/// Every mutation happens under the owning mutex, so hold placement is an
/// atomic check-and-set per worker — the engine's only correctness-critical
/// mutual-exclusion point.
#[derive(Debug, Default)]
struct Calendar {
    windows: Vec<AvailabilityWindow>,
}

pub struct AvailabilityLedger {
    calendars: RwLock<HashMap<Uuid, Arc<Mutex<Calendar>>>>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    draining: AtomicBool,
}

impl AvailabilityLedger {
    pub fn new(clock: Arc<dyn Clock>, hold_ttl_seconds: i64) -> Self {
        Self {
            calendars: RwLock::new(HashMap::new()),
            clock,
            hold_ttl: Duration::seconds(hold_ttl_seconds),
            draining: AtomicBool::new(false),
        }
    }

    /// Worker publishes a bookable interval. Overlap with any existing
    /// window of the same worker violates the calendar invariant.
    pub fn declare_window(
        &self,
        worker_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        if !valid_interval(start, end) {
            return Err(Error::conflict(worker_id, "window has non-positive length"));
        }
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);

        if cal.windows.iter().any(|w| w.overlaps(start, end)) {
            return Err(Error::conflict(
                worker_id,
                format!("window {}..{} overlaps an existing window", start, end),
            ));
        }
        cal.windows.push(AvailabilityWindow::free(worker_id, start, end));
        cal.windows.sort_by_key(|w| w.start);
        Ok(())
    }

    pub fn is_free(&self, worker_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<bool> {
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);
        Ok(cal
            .windows
            .iter()
            .any(|w| w.is_free() && w.covers(start, end)))
    }

    /// Earliest slot of `duration` inside a free window, starting no earlier
    /// than `earliest_start`. Deterministic: windows are scanned in start
    /// order.
    pub fn find_slot(
        &self,
        worker_id: Uuid,
        earliest_start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);
        Ok(first_slot(&cal, earliest_start, duration))
    }

    /// Coverage ratio in 0.0..=1.0 for the best free window able to host a
    /// job of `duration` starting at/after `earliest_start`. 1.0 means a
    /// full fit exists, 0.0 means no window helps at all.
    pub fn fitness(
        &self,
        worker_id: Uuid,
        earliest_start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<f64> {
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);

        let needed = duration.num_seconds().max(1) as f64;
        let mut best = 0.0f64;
        for w in cal.windows.iter().filter(|w| w.is_free()) {
            let usable_from = w.start.max(earliest_start);
            if usable_from >= w.end {
                continue;
            }
            let usable = (w.end - usable_from).num_seconds() as f64;
            best = best.max((usable / needed).min(1.0));
            if best >= 1.0 {
                break;
            }
        }
        Ok(best)
    }

    /// Pessimistic reservation: splits the covering free window into
    /// [free-before][held][free-after] under the worker's lock, or fails
    /// with `Conflict` leaving the calendar untouched.
    pub fn hold(
        &self,
        worker_id: Uuid,
        job_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandidateHold> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if !valid_interval(start, end) {
            return Err(Error::conflict(worker_id, "hold has non-positive length"));
        }

        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        let (now, _) = self.reap_expired(worker_id, &mut cal);

        let covering = cal
            .windows
            .iter()
            .position(|w| w.is_free() && w.covers(start, end));
        let Some(idx) = covering else {
            debug!(%worker_id, %job_id, "hold conflict: no free window covers the slot");
            return Err(Error::conflict(
                worker_id,
                format!("no free window covers {}..{}", start, end),
            ));
        };

        let hold = CandidateHold {
            id: Uuid::new_v4(),
            job_id,
            worker_id,
            start,
            end,
            expires_at: now + self.hold_ttl,
        };

        let original = cal.windows.remove(idx);
        let mut replacement = Vec::with_capacity(3);
        if original.start < start {
            replacement.push(AvailabilityWindow::free(worker_id, original.start, start));
        }
        replacement.push(AvailabilityWindow {
            worker_id,
            start,
            end,
            state: WindowState::Held {
                hold_id: hold.id,
                expires_at: hold.expires_at,
            },
        });
        if end < original.end {
            replacement.push(AvailabilityWindow::free(worker_id, end, original.end));
        }
        cal.windows.extend(replacement);
        cal.windows.sort_by_key(|w| w.start);

        debug!(%worker_id, %job_id, hold_id = %hold.id, "window held");
        Ok(hold)
    }

    /// Promote a held window to booked. An expired hold is never honored:
    /// the window has already reverted (or reverts here) to free.
    pub fn confirm(&self, hold: &CandidateHold) -> Result<AvailabilityWindow> {
        let calendar = self.calendar_of(hold.worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        let (now, _) = self.reap_expired(hold.worker_id, &mut cal);

        let found = cal.windows.iter_mut().find(
            |w| matches!(w.state, WindowState::Held { hold_id, .. } if hold_id == hold.id),
        );
        let Some(window) = found else {
            // Reaped above, or released earlier.
            return Err(Error::Expired { hold_id: hold.id });
        };
        if let WindowState::Held { expires_at, .. } = window.state {
            if expires_at <= now {
                return Err(Error::Expired { hold_id: hold.id });
            }
        }
        window.state = WindowState::Booked;
        info!(worker_id = %hold.worker_id, job_id = %hold.job_id, "booking confirmed");
        Ok(window.clone())
    }

    /// Rejection path: the held window reverts to free immediately.
    pub fn release(&self, hold: &CandidateHold) -> Result<()> {
        let calendar = self.calendar_of(hold.worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(hold.worker_id, &mut cal);

        let found = cal.windows.iter().position(
            |w| matches!(w.state, WindowState::Held { hold_id, .. } if hold_id == hold.id),
        );
        if let Some(idx) = found {
            cal.windows[idx].state = WindowState::Free;
            coalesce(&mut cal);
            debug!(worker_id = %hold.worker_id, hold_id = %hold.id, "hold released");
        }
        // Releasing an already-expired hold is a no-op, not an error.
        Ok(())
    }

    /// Completion (or cancellation of a confirmed booking): booked -> free.
    pub fn complete(
        &self,
        worker_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AvailabilityWindow> {
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);

        let found = cal
            .windows
            .iter()
            .position(|w| w.is_booked() && w.start == start && w.end == end);
        let Some(idx) = found else {
            return Err(Error::conflict(
                worker_id,
                format!("no booked window {}..{}", start, end),
            ));
        };
        cal.windows[idx].state = WindowState::Free;
        let completed = cal.windows[idx].clone();
        coalesce(&mut cal);
        info!(%worker_id, "booking completed, window returned to free");
        Ok(completed)
    }

    /// Snapshot-load path: re-insert a persisted window verbatim. Holds are
    /// negotiation-scoped and never persisted, so a window that was held
    /// when the snapshot was cut comes back free.
    pub fn restore_window(&self, window: AvailabilityWindow) -> Result<()> {
        let mut window = window;
        if matches!(window.state, WindowState::Held { .. }) {
            window.state = WindowState::Free;
        }
        if !valid_interval(window.start, window.end) {
            return Err(Error::conflict(
                window.worker_id,
                "window has non-positive length",
            ));
        }
        let calendar = self.calendar_of(window.worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        if cal
            .windows
            .iter()
            .any(|w| w.overlaps(window.start, window.end))
        {
            return Err(Error::conflict(
                window.worker_id,
                format!(
                    "restored window {}..{} overlaps an existing window",
                    window.start, window.end
                ),
            ));
        }
        cal.windows.push(window);
        cal.windows.sort_by_key(|w| w.start);
        Ok(())
    }

    pub fn windows_of(&self, worker_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let calendar = self.calendar_of(worker_id)?;
        let mut cal = lock_calendar(&calendar)?;
        self.reap_expired(worker_id, &mut cal);
        Ok(cal.windows.clone())
    }

    /// Sweep every calendar once, reverting expired holds. The same check
    /// runs lazily on access, so the sweeper only bounds how long an
    /// abandoned negotiation can sit on a quiet calendar.
    pub fn sweep(&self) -> Result<usize> {
        let calendars: Vec<(Uuid, Arc<Mutex<Calendar>>)> = {
            let map = self.calendars.read().map_err(|_| Error::Transient {
                context: "availability ledger lock poisoned",
            })?;
            map.iter().map(|(k, v)| (*k, Arc::clone(v))).collect()
        };

        let mut reaped = 0;
        for (worker_id, calendar) in calendars {
            let mut cal = lock_calendar(&calendar)?;
            reaped += self.reap_expired(worker_id, &mut cal).1;
        }
        if reaped > 0 {
            info!(reaped, "expired holds swept");
        }
        Ok(reaped)
    }

    /// Periodic sweeper in the same shape as the other background workers:
    /// a plain spawned loop. Aborted via the returned handle on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval_seconds: u64) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(StdDuration::from_secs(interval_seconds.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = ledger.sweep() {
                    warn!(error = %e, "hold sweep failed");
                }
            }
        })
    }

    /// Graceful drain: refuse new holds, let in-flight ones confirm,
    /// release, or expire.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
        info!("availability ledger draining: new holds rejected");
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn clear(&self) -> Result<()> {
        let mut map = self.calendars.write().map_err(|_| Error::Transient {
            context: "availability ledger lock poisoned",
        })?;
        map.clear();
        Ok(())
    }

    /// Revert expired holds in one calendar. Returns the current time (so
    /// callers reuse a single clock read per operation) and how many holds
    /// were reverted.
    fn reap_expired(
        &self,
        worker_id: Uuid,
        cal: &mut MutexGuard<'_, Calendar>,
    ) -> (DateTime<Utc>, usize) {
        let now = self.clock.now();
        let mut reverted = 0usize;
        for w in cal.windows.iter_mut() {
            if let WindowState::Held { hold_id, expires_at } = w.state {
                if expires_at <= now {
                    debug!(%worker_id, %hold_id, "hold expired, window reverts to free");
                    w.state = WindowState::Free;
                    reverted += 1;
                }
            }
        }
        if reverted > 0 {
            coalesce(cal);
        }
        (now, reverted)
    }

    fn calendar_of(&self, worker_id: Uuid) -> Result<Arc<Mutex<Calendar>>> {
        {
            let map = self.calendars.read().map_err(|_| Error::Transient {
                context: "availability ledger lock poisoned",
            })?;
            if let Some(found) = map.get(&worker_id) {
                return Ok(Arc::clone(found));
            }
        }
        let mut map = self.calendars.write().map_err(|_| Error::Transient {
            context: "availability ledger lock poisoned",
        })?;
        Ok(Arc::clone(map.entry(worker_id).or_default()))
    }
}

fn lock_calendar(calendar: &Arc<Mutex<Calendar>>) -> Result<MutexGuard<'_, Calendar>> {
    calendar.lock().map_err(|_| Error::Transient {
        context: "worker calendar lock poisoned",
    })
}

fn first_slot(
    cal: &Calendar,
    earliest_start: DateTime<Utc>,
    duration: Duration,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    for w in cal.windows.iter().filter(|w| w.is_free()) {
        let start = w.start.max(earliest_start);
        let end = start + duration;
        if end <= w.end {
            return Some((start, end));
        }
    }
    None
}

/// Merge adjacent free windows sharing an endpoint, keeping the calendar in
/// its canonical sorted, non-overlapping form.
fn coalesce(cal: &mut MutexGuard<'_, Calendar>) {
    cal.windows.sort_by_key(|w| w.start);
    let mut merged: Vec<AvailabilityWindow> = Vec::with_capacity(cal.windows.len());
    for w in cal.windows.drain(..) {
        match merged.last_mut() {
            Some(prev) if prev.is_free() && w.is_free() && prev.end == w.start => {
                prev.end = w.end;
            }
            _ => merged.push(w),
        }
    }
    cal.windows = merged;
}
