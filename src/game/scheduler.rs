//! Fixed-step update scheduler
//!
//! The host calls [`UpdateScheduler::update`] once per frame with the current
//! time. The scheduler runs as many fixed-size steps as fit in the elapsed
//! time, so the simulation step never depends on the host frame rate.
//!
//! If the host stalls and the backlog grows past `max_update_delta`, the clock
//! is snapped forward and the backlog is dropped instead of replayed.

use tracing::{debug, info, warn};

use crate::game::clock::{elapsed, TickCount};

/// Default simulation step in milliseconds
pub const DEFAULT_UPDATE_RATE_MS: u32 = 20;

/// Largest backlog replayed in a single update
pub const DEFAULT_MAX_UPDATE_DELTA_MS: u32 = 5000;

/// Receiver of fixed simulation steps
pub trait MapUpdater {
    /// Advance every map by exactly `delta_ms`
    fn update_maps(&mut self, delta_ms: u32);
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No update seen yet; the next one only starts the clock
    Uninitialized,
    /// Stepping normally
    Running,
    /// Updates are ignored until resumed
    Paused,
}

impl SchedulerState {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerState::Uninitialized => "Uninitialized",
            SchedulerState::Running => "Running",
            SchedulerState::Paused => "Paused",
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one [`UpdateScheduler::update`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Steps run
    pub steps: u32,
    /// Backlog discarded by a snap, in milliseconds
    pub skipped_ms: u32,
}

/// Fixed-timestep scheduler
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    update_rate: u32,
    max_update_delta: u32,
    last_update_time: TickCount,
    state: SchedulerState,
    total_steps: u64,
    total_skipped_ms: u64,
}

impl UpdateScheduler {
    /// Create a scheduler. The rate is at least 1 ms and the backlog cap at
    /// least one step.
    pub fn new(update_rate: u32, max_update_delta: u32) -> Self {
        let update_rate = update_rate.max(1);
        Self {
            update_rate,
            max_update_delta: max_update_delta.max(update_rate),
            last_update_time: 0,
            state: SchedulerState::Uninitialized,
            total_steps: 0,
            total_skipped_ms: 0,
        }
    }

    pub fn update_rate(&self) -> u32 {
        self.update_rate
    }

    pub fn max_update_delta(&self) -> u32 {
        self.max_update_delta
    }

    /// Time of the last processed step boundary
    pub fn last_update_time(&self) -> TickCount {
        self.last_update_time
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Steps run since creation
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Milliseconds of backlog discarded since creation
    pub fn total_skipped_ms(&self) -> u64 {
        self.total_skipped_ms
    }

    /// Stop stepping until [`resume`](Self::resume) is called
    pub fn pause(&mut self) {
        if self.state != SchedulerState::Paused {
            info!("World updates paused");
            self.state = SchedulerState::Paused;
        }
    }

    /// Resume after a pause. The next update restarts the clock, so time
    /// spent paused is not caught up.
    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            info!("World updates resumed");
            self.state = SchedulerState::Uninitialized;
        }
    }

    /// Run every step due at `now`
    pub fn update<U: MapUpdater + ?Sized>(&mut self, now: TickCount, maps: &mut U) -> UpdateReport {
        match self.state {
            SchedulerState::Paused => return UpdateReport::default(),
            SchedulerState::Uninitialized => {
                self.last_update_time = now;
                self.state = SchedulerState::Running;
                debug!(now, update_rate = self.update_rate, "World clock started");
                return UpdateReport::default();
            }
            SchedulerState::Running => {}
        }

        let mut report = UpdateReport::default();

        let behind = elapsed(now, self.last_update_time);
        if behind > self.max_update_delta {
            let snapped = now.wrapping_sub(self.update_rate).wrapping_sub(1);
            report.skipped_ms = elapsed(snapped, self.last_update_time);
            self.total_skipped_ms += report.skipped_ms as u64;
            warn!(
                behind_ms = behind,
                skipped_ms = report.skipped_ms,
                max_update_delta_ms = self.max_update_delta,
                "World update fell behind, skipping backlog"
            );
            self.last_update_time = snapped;
        }

        while elapsed(now, self.last_update_time) >= self.update_rate {
            maps.update_maps(self.update_rate);
            self.last_update_time = self.last_update_time.wrapping_add(self.update_rate);
            report.steps += 1;
        }

        self.total_steps += report.steps as u64;
        report
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_RATE_MS, DEFAULT_MAX_UPDATE_DELTA_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: u32,
        deltas: Vec<u32>,
    }

    impl MapUpdater for Counter {
        fn update_maps(&mut self, delta_ms: u32) {
            self.calls += 1;
            self.deltas.push(delta_ms);
        }
    }

    fn started(now: TickCount) -> (UpdateScheduler, Counter) {
        let mut scheduler = UpdateScheduler::new(20, 5000);
        let mut counter = Counter::default();
        scheduler.update(now, &mut counter);
        (scheduler, counter)
    }

    #[test]
    fn test_first_update_only_starts_clock() {
        let mut scheduler = UpdateScheduler::new(20, 5000);
        let mut counter = Counter::default();
        assert_eq!(scheduler.state(), SchedulerState::Uninitialized);

        let report = scheduler.update(1_000_000, &mut counter);
        assert_eq!(report, UpdateReport::default());
        assert_eq!(counter.calls, 0);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.last_update_time(), 1_000_000);
    }

    #[test]
    fn test_short_frames_run_nothing() {
        let (mut scheduler, mut counter) = started(1000);
        scheduler.update(1010, &mut counter);
        scheduler.update(1019, &mut counter);
        assert_eq!(counter.calls, 0);
    }

    #[test]
    fn test_exact_rate_runs_one_step() {
        let (mut scheduler, mut counter) = started(1000);
        let report = scheduler.update(1020, &mut counter);
        assert_eq!(report.steps, 1);
        assert_eq!(counter.deltas, vec![20]);
        assert_eq!(scheduler.last_update_time(), 1020);
    }

    #[test]
    fn test_remainder_carries_over() {
        let (mut scheduler, mut counter) = started(0);
        assert_eq!(scheduler.update(50, &mut counter).steps, 2);
        assert_eq!(scheduler.last_update_time(), 40);
        assert_eq!(scheduler.update(60, &mut counter).steps, 1);
        assert_eq!(counter.calls, 3);
        assert!(counter.deltas.iter().all(|&d| d == 20));
    }

    #[test]
    fn test_backlog_is_capped() {
        let (mut scheduler, mut counter) = started(0);
        let report = scheduler.update(12_000, &mut counter);
        assert!(report.steps <= 5000 / 20 + 1);
        assert_eq!(report.steps, 1);
        assert_eq!(report.skipped_ms, 12_000 - 21);
        assert_eq!(scheduler.total_skipped_ms(), 11_979);
        assert!(elapsed(12_000, scheduler.last_update_time()) < 20);
    }

    #[test]
    fn test_backlog_at_limit_is_replayed() {
        let (mut scheduler, mut counter) = started(0);
        let report = scheduler.update(5000, &mut counter);
        assert_eq!(report.steps, 250);
        assert_eq!(report.skipped_ms, 0);
    }

    #[test]
    fn test_clock_wraparound() {
        let start = u32::MAX - 30;
        let (mut scheduler, mut counter) = started(start);
        let report = scheduler.update(start.wrapping_add(45), &mut counter);
        assert_eq!(report.steps, 2);
        assert_eq!(scheduler.last_update_time(), start.wrapping_add(40));
        assert_eq!(counter.calls, 2);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut scheduler, mut counter) = started(0);
        scheduler.pause();
        assert_eq!(scheduler.update(1000, &mut counter).steps, 0);
        assert_eq!(scheduler.state(), SchedulerState::Paused);

        scheduler.resume();
        // Restarts the clock instead of replaying the pause
        assert_eq!(scheduler.update(60_000, &mut counter).steps, 0);
        assert_eq!(scheduler.update(60_020, &mut counter).steps, 1);
        assert_eq!(scheduler.total_steps(), 1);
    }

    #[test]
    fn test_rate_floor() {
        let scheduler = UpdateScheduler::new(0, 0);
        assert_eq!(scheduler.update_rate(), 1);
        assert_eq!(scheduler.max_update_delta(), 1);
    }
}
