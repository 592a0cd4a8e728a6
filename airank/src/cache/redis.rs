//! Redis implementation of the ranking cache.
//!
//! Keyspace:
//! - `rank:all_time`, `rank:daily:<date>`, `rank:weekly:<week>`: sorted
//!   sets of handle -> score
//! - `user:<handle>`: per-principal summary hash
//! - `throughput:<epoch second>`: per-second token counters with a TTL
//! - `system:throughput:peak`: all-time per-second peak scalar

use super::{RankingCache, Result};
use crate::aggregation::windows::{WindowKeys, ALL_TIME_WINDOW};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

const PEAK_KEY: &str = "system:throughput:peak";

fn throughput_key(epoch_second: i64) -> String {
    format!("throughput:{epoch_second}")
}

fn user_key(handle: &str) -> String {
    format!("user:{handle}")
}

/// Ranking cache over a shared multiplexed Redis connection.
///
/// The connection manager reconnects on its own; individual command
/// failures surface as [`super::CacheError`] and are swallowed upstream.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl RankingCache for RedisCache {
    async fn bump_window_scores(&self, handle: &str, tokens: i64, windows: &WindowKeys) -> Result<()> {
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.zincr(ALL_TIME_WINDOW, handle, tokens)
            .ignore()
            .zincr(&windows.daily, handle, tokens)
            .ignore()
            .zincr(&windows.weekly, handle, tokens)
            .ignore()
            .hincr(user_key(handle), "total_tokens", tokens)
            .ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn track_throughput(&self, epoch_second: i64, tokens: i64, retain_for: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let key = throughput_key(epoch_second);

        let total: i64 = conn.incr(&key, tokens).await?;
        let _: i64 = conn.expire(&key, retain_for.as_secs() as i64).await?;
        Ok(total)
    }

    async fn peak_throughput(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        let peak: Option<i64> = conn.get(PEAK_KEY).await?;
        Ok(peak.unwrap_or(0))
    }

    async fn promote_peak(&self, candidate: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(PEAK_KEY, candidate).await?;
        Ok(())
    }
}
