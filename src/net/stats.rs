//! Per-message statistics
//!
//! Every dispatched message updates a small record keyed by message id. The
//! update path is lock-free per id (dashmap shard locks only), since it runs
//! once per received packet.
//!
//! The table can optionally be flushed to a text file on a timer. Flushing is
//! best effort: write failures are logged and never reach the dispatcher.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::clock::{SystemClock, TickCount, TimeSource};

/// Usage of a single message id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    /// Times the message was dispatched
    pub calls: u64,
    /// Sum of message lengths, in bits
    pub total_bits: u64,
    /// Shortest message seen, in bits
    pub min_bits: u32,
    /// Longest message seen, in bits
    pub max_bits: u32,
    /// Clock time of the last dispatch
    pub last_executed: TickCount,
}

impl ProcessorStats {
    fn first(length_bits: u32, now: TickCount) -> Self {
        Self {
            calls: 1,
            total_bits: length_bits as u64,
            min_bits: length_bits,
            max_bits: length_bits,
            last_executed: now,
        }
    }

    fn record(&mut self, length_bits: u32, now: TickCount) {
        self.calls += 1;
        self.total_bits += length_bits as u64;
        self.min_bits = self.min_bits.min(length_bits);
        self.max_bits = self.max_bits.max(length_bits);
        self.last_executed = now;
    }

    /// Mean message length in bits
    pub fn average_bits(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_bits / self.calls
        }
    }
}

/// Statistics for every message id seen so far
pub struct MessageStats {
    stats: DashMap<u8, ProcessorStats>,
    clock: Arc<dyn TimeSource>,
    output: Mutex<Option<JoinHandle<()>>>,
}

impl MessageStats {
    /// Tracker timestamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            stats: DashMap::new(),
            clock,
            output: Mutex::new(None),
        }
    }

    /// Stats for a message id. Reading never creates a record.
    pub fn get_stats(&self, id: u8) -> Option<ProcessorStats> {
        self.stats.get(&id).map(|entry| *entry)
    }

    /// Record one dispatch of `id` with a message of `length_bits`
    pub fn query_executed(&self, id: u8, length_bits: u32) {
        let now = self.clock.now();
        self.stats
            .entry(id)
            .and_modify(|stats| stats.record(length_bits, now))
            .or_insert_with(|| ProcessorStats::first(length_bits, now));
    }

    /// Number of distinct ids seen
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Every record, ordered by id
    pub fn snapshot(&self) -> Vec<(u8, ProcessorStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn reset(&self) {
        self.stats.clear();
    }

    /// Text table of every record
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Message statistics - {}", Utc::now().to_rfc3339());
        let _ = writeln!(
            out,
            "{:>4} {:>10} {:>14} {:>8} {:>8} {:>8} {:>12}",
            "id", "calls", "total_bits", "avg", "min", "max", "last"
        );
        for (id, stats) in self.snapshot() {
            let _ = writeln!(
                out,
                "{:>4} {:>10} {:>14} {:>8} {:>8} {:>8} {:>12}",
                id,
                stats.calls,
                stats.total_bits,
                stats.average_bits(),
                stats.min_bits,
                stats.max_bits,
                stats.last_executed
            );
        }
        out
    }

    /// Records as JSON, keyed by id
    pub fn to_json(&self) -> serde_json::Result<String> {
        let map: std::collections::BTreeMap<u8, ProcessorStats> =
            self.snapshot().into_iter().collect();
        serde_json::to_string_pretty(&map)
    }

    /// Write the table to a file
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.render()).await
    }

    /// Start flushing the table to `path` every `dump_rate`. Replaces any
    /// earlier output task.
    pub fn enable_file_output(self: &Arc<Self>, path: impl Into<PathBuf>, dump_rate: Duration) {
        let path = path.into();
        let stats = Arc::clone(self);
        info!(path = %path.display(), dump_rate_ms = dump_rate.as_millis() as u64, "Message stats file output enabled");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(dump_rate);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match stats.write_to(&path).await {
                    Ok(()) => debug!(path = %path.display(), "Message stats written"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to write message stats"),
                }
            }
        });

        if let Some(previous) = self.output.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic flush, if running
    pub fn disable_file_output(&self) {
        if let Some(handle) = self.output.lock().take() {
            handle.abort();
            info!("Message stats file output disabled");
        }
    }

    pub fn is_file_output_enabled(&self) -> bool {
        self.output.lock().is_some()
    }
}

impl Default for MessageStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageStats {
    fn drop(&mut self) {
        if let Some(handle) = self.output.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for MessageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStats")
            .field("ids", &self.stats.len())
            .field("file_output", &self.is_file_output_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::clock::ManualClock;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stats_accumulate() {
        let clock = ManualClock::new(100);
        let stats = MessageStats::with_clock(Arc::new(clock.clone()));

        stats.query_executed(7, 10);
        stats.query_executed(7, 50);
        clock.advance(25);
        stats.query_executed(7, 30);

        assert_eq!(
            stats.get_stats(7),
            Some(ProcessorStats {
                calls: 3,
                total_bits: 90,
                min_bits: 10,
                max_bits: 50,
                last_executed: 125,
            })
        );
        assert_eq!(stats.get_stats(7).unwrap().average_bits(), 30);
    }

    #[test]
    fn test_get_does_not_create() {
        let stats = MessageStats::new();
        assert!(stats.get_stats(3).is_none());
        assert!(stats.is_empty());
        stats.query_executed(3, 0);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats.get_stats(3).unwrap().min_bits, 0);
    }

    #[test]
    fn test_render_sorted_by_id() {
        let stats = MessageStats::new();
        stats.query_executed(9, 8);
        stats.query_executed(2, 16);

        let text = stats.render();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# Message statistics"));
        assert!(lines[2].trim_start().starts_with('2'));
        assert!(lines[3].trim_start().starts_with('9'));

        let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(json["2"]["total_bits"], 16);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(MessageStats::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.query_executed(1, 8);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(stats.get_stats(1).unwrap().calls, 4000);
    }

    #[tokio::test]
    async fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.txt");
        let stats = MessageStats::new();
        stats.query_executed(4, 24);

        stats.write_to(&path).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("total_bits"));
        assert!(content.lines().count() >= 3);
    }

    #[tokio::test]
    async fn test_periodic_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("periodic.txt");
        let stats = Arc::new(MessageStats::new());
        stats.query_executed(1, 8);

        stats.enable_file_output(&path, Duration::from_millis(20));
        assert!(stats.is_file_output_enabled());
        tokio::time::sleep(Duration::from_millis(150)).await;
        stats.disable_file_output();
        assert!(!stats.is_file_output_enabled());

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("stats.txt");
        let stats = Arc::new(MessageStats::new());

        stats.enable_file_output(&path, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        stats.query_executed(1, 8);
        assert_eq!(stats.get_stats(1).unwrap().calls, 1);
        stats.disable_file_output();
    }
}
