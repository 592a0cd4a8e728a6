//! Volatile store: fast-path rankings and throughput tracking.
//!
//! Everything behind [`RankingCache`] is advisory cache state, rebuildable
//! from the usage log. Its failures never fail an ingestion request; the
//! aggregation engine downgrades them to warnings at this boundary.

pub mod memory;
pub mod redis;

use crate::aggregation::windows::WindowKeys;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Backend(#[from] ::redis::RedisError),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Time-windowed ranking scores and peak-throughput tracking.
#[async_trait::async_trait]
pub trait RankingCache: Send + Sync {
    /// Add `tokens` to the principal's score in the all-time, daily, and
    /// weekly windows, and to the per-principal summary counter.
    async fn bump_window_scores(&self, handle: &str, tokens: i64, windows: &WindowKeys) -> Result<()>;

    /// Add `tokens` to the bucket for `epoch_second` and return the
    /// bucket's accumulated value. Buckets are reclaimed after
    /// `retain_for`.
    async fn track_throughput(&self, epoch_second: i64, tokens: i64, retain_for: Duration) -> Result<i64>;

    /// The stored all-time per-second peak (0 if never set).
    async fn peak_throughput(&self) -> Result<i64>;

    /// Record a new peak candidate. Callers pass a value they observed to
    /// exceed the stored peak; the check-then-set pair is not atomic and a
    /// concurrent writer may briefly win with a smaller value.
    async fn promote_peak(&self, candidate: i64) -> Result<()>;
}
