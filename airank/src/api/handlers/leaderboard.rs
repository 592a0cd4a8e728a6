//! Leaderboard read endpoint.

use crate::api::models::leaderboard::{assign_ranks, GraphPoint, LeaderboardResponse, LeaderboardStats};
use crate::errors::Result;
use crate::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use tokio::time::timeout;
use tracing::warn;

/// Ranked users plus aggregate activity stats.
///
/// Reads the durable store only; the volatile store contributes the peak
/// figure and degrades to 0 when unavailable rather than failing the
/// query.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "leaderboard",
    responses((status = 200, body = LeaderboardResponse))
)]
pub async fn get_leaderboard(State(state): State<AppState>) -> Result<Json<LeaderboardResponse>> {
    let profiles = state.durable.top_profiles(state.config.leaderboard.limit).await?;
    let users = assign_ranks(profiles);

    let since = Utc::now() - chrono::Duration::hours(24);
    let stats = state.durable.usage_stats(since).await?;

    let peak_throughput = match timeout(state.config.cache.command_timeout, state.cache.peak_throughput()).await {
        Ok(Ok(peak)) => peak,
        Ok(Err(error)) => {
            warn!(%error, "peak throughput unavailable, reporting zero");
            0
        }
        Err(_) => {
            warn!("peak throughput lookup timed out, reporting zero");
            0
        }
    };

    Ok(Json(LeaderboardResponse {
        users,
        stats: LeaderboardStats {
            peak_throughput,
            last_24h_tokens: stats.window_tokens,
            active_users_24h: stats.active_users,
            graph_data: stats.graph.into_iter().map(GraphPoint::from).collect(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::cache::RankingCache;
    use crate::db::{DurableStore, NewUsageLogEntry, UsageDeltas};
    use crate::test_utils::{test_app, FailingCache, MemoryStore};
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn seed_usage(store: &MemoryStore, handle: &str, total: i64) {
        let profile = store.profile_by_handle(handle).await.unwrap().unwrap();
        store
            .increment_usage(
                profile.id,
                &UsageDeltas {
                    input: total,
                    total,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .append_usage_log(&NewUsageLogEntry {
                user_id: profile.id,
                twitter_handle: handle.to_string(),
                token_count: total,
                input_tokens: total,
                output_tokens: 0,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            })
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_leaderboard_orders_and_ranks() {
        let store = Arc::new(MemoryStore::new());
        for handle in ["a", "b", "c", "d"] {
            store.add_profile(handle, "digest").await;
        }
        seed_usage(&store, "a", 300).await;
        seed_usage(&store, "b", 100).await;
        seed_usage(&store, "c", 300).await;
        seed_usage(&store, "d", 50).await;

        let server = test_app(store, Arc::new(MemoryCache::new())).await;
        let response = server.get("/api/leaderboard").await;
        response.assert_status(StatusCode::OK);

        let body: LeaderboardResponse = response.json();
        let handles: Vec<&str> = body.users.iter().map(|user| user.twitter_handle.as_str()).collect();
        let ranks: Vec<i64> = body.users.iter().map(|user| user.rank).collect();
        assert_eq!(handles, vec!["a", "c", "b", "d"]);
        assert_eq!(ranks, vec![1, 1, 3, 4]);

        assert_eq!(body.stats.last_24h_tokens, 750);
        assert_eq!(body.stats.active_users_24h, 4);
        assert!(!body.stats.graph_data.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_peak_comes_from_the_cache() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        cache.promote_peak(4_242).await.unwrap();

        let server = test_app(store, cache).await;
        let body: LeaderboardResponse = server.get("/api/leaderboard").await.json();

        assert_eq!(body.stats.peak_throughput, 4_242);
    }

    #[test_log::test(tokio::test)]
    async fn test_cache_outage_degrades_peak_to_zero() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("alice", "digest").await;
        seed_usage(&store, "alice", 10).await;

        let server = test_app(store, Arc::new(FailingCache)).await;
        let response = server.get("/api/leaderboard").await;

        response.assert_status(StatusCode::OK);
        let body: LeaderboardResponse = response.json();
        assert_eq!(body.stats.peak_throughput, 0);
        assert_eq!(body.users.len(), 1);
    }
}
