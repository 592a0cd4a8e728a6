//! The aggregation engine: applies one usage event to both storage layers.
//!
//! Effect order per event:
//!
//! 1. volatile window ranking bumps (best effort)
//! 2. volatile throughput/peak tracking (best effort)
//! 3. durable atomic counter increment (authoritative)
//! 4. durable usage-log append (authoritative)
//!
//! The volatile section runs under a short deadline and fails open: a
//! degraded cache layer never blocks ingestion. Durable failures fail the
//! request; the caller retries under at-least-once semantics, so a retried
//! event double-counts by design.

pub mod windows;

use crate::cache::{self, RankingCache};
use crate::db::{DurableStore, NewUsageLogEntry, ProfileRecord};
use crate::errors::Result;
use crate::ingest::UsageEvent;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{instrument, warn};
use windows::WindowKeys;

/// Result of a successfully applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOutcome {
    /// Total tokens applied, echoed back to the reporter.
    pub tokens: i64,
}

pub struct Engine {
    durable: Arc<dyn DurableStore>,
    cache: Arc<dyn RankingCache>,
    cache_deadline: Duration,
    throughput_window: Duration,
}

impl Engine {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        cache: Arc<dyn RankingCache>,
        cache_deadline: Duration,
        throughput_window: Duration,
    ) -> Self {
        Self {
            durable,
            cache,
            cache_deadline,
            throughput_window,
        }
    }

    /// Apply an event stamped with the current wall clock.
    pub async fn apply(&self, principal: &ProfileRecord, event: &UsageEvent) -> Result<AggregationOutcome> {
        self.apply_at(principal, event, Utc::now()).await
    }

    #[instrument(skip_all, fields(handle = %principal.twitter_handle, tokens = event.total_tokens()))]
    pub(crate) async fn apply_at(
        &self,
        principal: &ProfileRecord,
        event: &UsageEvent,
        at: DateTime<Utc>,
    ) -> Result<AggregationOutcome> {
        let total = event.total_tokens();
        if total == 0 {
            return Ok(AggregationOutcome { tokens: 0 });
        }

        // Steps 1-2: advisory cache state, bounded by its own deadline.
        let volatile = match timeout(self.cache_deadline, self.apply_volatile(principal, event, at)).await {
            Ok(result) => result,
            Err(_) => Err(cache::CacheError::Timeout(self.cache_deadline)),
        };
        if let Err(error) = volatile {
            warn!(%error, "volatile ranking update failed, continuing");
        }

        // Steps 3-4: authoritative. Either both land or the request fails.
        self.durable.increment_usage(principal.id, &event.deltas()).await?;
        self.durable
            .append_usage_log(&NewUsageLogEntry {
                user_id: principal.id,
                twitter_handle: principal.twitter_handle.clone(),
                token_count: total,
                input_tokens: event.input,
                output_tokens: event.output,
                cache_read_tokens: event.cache_read,
                cache_write_tokens: event.cache_write,
            })
            .await?;

        Ok(AggregationOutcome { tokens: total })
    }

    async fn apply_volatile(&self, principal: &ProfileRecord, event: &UsageEvent, at: DateTime<Utc>) -> cache::Result<()> {
        let total = event.total_tokens();

        let keys = WindowKeys::at(at);
        self.cache.bump_window_scores(&principal.twitter_handle, total, &keys).await?;

        let second_total = self.cache.track_throughput(at.timestamp(), total, self.throughput_window).await?;

        // Read-compare-set: concurrent writers may race this pair and the
        // stored peak can briefly lag one request behind.
        if second_total > self.cache.peak_throughput().await? {
            self.cache.promote_peak(second_total).await?;
        }

        Ok(())
    }
}
