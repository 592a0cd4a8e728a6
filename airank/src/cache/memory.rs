//! In-process ranking cache.
//!
//! Used when no Redis URL is configured: rankings and peak tracking keep
//! working per-instance instead of disappearing entirely. Also the test
//! double, since its behavior matches the Redis implementation minus the
//! network.

use super::{RankingCache, Result};
use crate::aggregation::windows::{WindowKeys, ALL_TIME_WINDOW};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    /// window key -> handle -> score
    windows: HashMap<String, HashMap<String, i64>>,
    /// handle -> volatile summary counter
    user_totals: HashMap<String, i64>,
    /// epoch second -> accumulated tokens
    buckets: HashMap<i64, i64>,
    peak: i64,
}

#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn window_score(&self, window: &str, handle: &str) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state.windows.get(window).and_then(|scores| scores.get(handle)).copied()
    }

    #[cfg(test)]
    pub fn user_total(&self, handle: &str) -> Option<i64> {
        self.state.lock().unwrap().user_totals.get(handle).copied()
    }

    #[cfg(test)]
    pub fn bucket_total(&self, epoch_second: i64) -> Option<i64> {
        self.state.lock().unwrap().buckets.get(&epoch_second).copied()
    }
}

#[async_trait::async_trait]
impl RankingCache for MemoryCache {
    async fn bump_window_scores(&self, handle: &str, tokens: i64, windows: &WindowKeys) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for window in [ALL_TIME_WINDOW, windows.daily.as_str(), windows.weekly.as_str()] {
            *state
                .windows
                .entry(window.to_string())
                .or_default()
                .entry(handle.to_string())
                .or_default() += tokens;
        }
        *state.user_totals.entry(handle.to_string()).or_default() += tokens;
        Ok(())
    }

    async fn track_throughput(&self, epoch_second: i64, tokens: i64, retain_for: Duration) -> Result<i64> {
        let mut state = self.state.lock().unwrap();

        let horizon = epoch_second - retain_for.as_secs() as i64;
        state.buckets.retain(|second, _| *second > horizon);

        let bucket = state.buckets.entry(epoch_second).or_default();
        *bucket += tokens;
        Ok(*bucket)
    }

    async fn peak_throughput(&self) -> Result<i64> {
        Ok(self.state.lock().unwrap().peak)
    }

    async fn promote_peak(&self, candidate: i64) -> Result<()> {
        // Max-merge rather than overwrite: within one process the stored
        // peak never moves backwards even when promotions race.
        let mut state = self.state.lock().unwrap();
        state.peak = state.peak.max(candidate);
        Ok(())
    }
}
