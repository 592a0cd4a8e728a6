//! Per-user read endpoint.

use crate::api::models::leaderboard::RankedUser;
use crate::auth::verifier;
use crate::errors::{Error, Result};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};

/// A single ranked user by handle.
///
/// The rank is `(count of principals with a strictly greater total) + 1`,
/// which matches the position competition ranking assigns in the
/// leaderboard listing.
#[utoipa::path(
    get,
    path = "/api/user/{handle}",
    tag = "leaderboard",
    params(("handle" = String, Path, description = "Principal handle, leading @ optional")),
    responses(
        (status = 200, body = RankedUser),
        (status = 404, description = "Unknown handle"),
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(handle): Path<String>) -> Result<Json<RankedUser>> {
    let handle = verifier::normalize_handle(&handle);

    let profile = state
        .durable
        .profile_by_handle(&handle)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "User".into() })?;

    let above = state.durable.profiles_above(profile.total_tokens).await?;
    Ok(Json(RankedUser::from_profile(profile, above + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::db::{DurableStore, UsageDeltas};
    use crate::test_utils::{test_app, MemoryStore};
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn seed_totals(store: &MemoryStore, handle: &str, input: i64, cache_read: i64) {
        let profile = store.profile_by_handle(handle).await.unwrap().unwrap();
        store
            .increment_usage(
                profile.id,
                &UsageDeltas {
                    input,
                    cache_read,
                    total: input,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_get_user_reports_rank_and_savings() {
        let store = Arc::new(MemoryStore::new());
        store.add_profile("alice", "digest").await;
        store.add_profile("bob", "digest").await;
        seed_totals(&store, "alice", 80, 20).await;
        seed_totals(&store, "bob", 500, 0).await;

        let server = test_app(store, Arc::new(MemoryCache::new())).await;
        let response = server.get("/api/user/@Alice").await;
        response.assert_status(StatusCode::OK);

        let user: RankedUser = response.json();
        assert_eq!(user.twitter_handle, "alice");
        assert_eq!(user.rank, 2);
        assert_eq!(user.savings_score, 20.0);
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_handle_is_404() {
        let store = Arc::new(MemoryStore::new());
        let server = test_app(store, Arc::new(MemoryCache::new())).await;

        let response = server.get("/api/user/nobody").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
