//! API models for leaderboard and per-user reads.

use crate::db::{HourBucket, ProfileRecord};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A principal with its rank and derived presentation fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RankedUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub twitter_handle: String,
    pub avatar_url: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    /// Ranking total: input + output, cache categories excluded.
    pub total_tokens: i64,
    /// Share of prompt tokens served from cache, percent. Derived on
    /// every read, never stored.
    pub savings_score: f64,
    pub rank: i64,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RankedUser {
    pub fn from_profile(profile: ProfileRecord, rank: i64) -> Self {
        let savings_score = savings_score(profile.input_tokens, profile.cache_read_tokens);
        Self {
            id: profile.id,
            twitter_handle: profile.twitter_handle,
            avatar_url: profile.avatar_url,
            input_tokens: profile.input_tokens,
            output_tokens: profile.output_tokens,
            cache_read_tokens: profile.cache_read_tokens,
            cache_write_tokens: profile.cache_write_tokens,
            total_tokens: profile.total_tokens,
            savings_score,
            rank,
            last_active: profile.last_active,
            created_at: profile.created_at,
        }
    }
}

/// `cache_read / (input + cache_read) * 100`, 0 when the denominator is zero.
pub fn savings_score(input_tokens: i64, cache_read_tokens: i64) -> f64 {
    let denominator = input_tokens.saturating_add(cache_read_tokens);
    if denominator <= 0 {
        0.0
    } else {
        cache_read_tokens as f64 / denominator as f64 * 100.0
    }
}

/// Assign competition ranks to profiles already ordered by total DESC,
/// creation ASC: equal totals share a rank, and the next distinct total
/// takes its list position. Matches the `profiles_above + 1` rank used
/// for single-user lookups.
pub fn assign_ranks(profiles: Vec<ProfileRecord>) -> Vec<RankedUser> {
    let mut ranked = Vec::with_capacity(profiles.len());
    let mut previous_total: Option<i64> = None;
    let mut current_rank = 1i64;

    for (position, profile) in profiles.into_iter().enumerate() {
        if previous_total != Some(profile.total_tokens) {
            current_rank = position as i64 + 1;
            previous_total = Some(profile.total_tokens);
        }
        ranked.push(RankedUser::from_profile(profile, current_rank));
    }

    ranked
}

/// One hourly point of the activity chart.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphPoint {
    pub time: DateTime<Utc>,
    pub tokens: i64,
    pub active_users: i64,
}

impl From<HourBucket> for GraphPoint {
    fn from(bucket: HourBucket) -> Self {
        Self {
            time: bucket.hour,
            tokens: bucket.tokens,
            active_users: bucket.active_users,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardStats {
    /// Highest observed per-second token throughput; 0 when the volatile
    /// store is unavailable.
    pub peak_throughput: i64,
    pub last_24h_tokens: i64,
    pub active_users_24h: i64,
    pub graph_data: Vec<GraphPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardResponse {
    pub users: Vec<RankedUser>,
    pub stats: LeaderboardStats,
}
