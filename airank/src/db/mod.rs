//! Durable store: the relational system of record.
//!
//! The [`DurableStore`] trait is the authoritative-store side of the
//! dual-store boundary: everything behind it must succeed for an ingestion
//! request to count, while the volatile side (see [`crate::cache`]) fails
//! open. Production uses [`postgres::PgStore`]; tests use an in-memory
//! double.

pub mod errors;
pub mod postgres;

use crate::types::UserId;
use chrono::{DateTime, Utc};
use errors::Result;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A ranked principal as stored in `profiles`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRecord {
    pub id: UserId,
    pub twitter_handle: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key_hash: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub total_tokens: i64,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a profile on first authenticated sync.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub twitter_handle: String,
    pub avatar_url: Option<String>,
    pub api_key_digest: String,
}

/// Per-category deltas applied to a profile's counters in one atomic step.
///
/// `total` is the ranking-total delta (input + output + unattributed);
/// cache categories are tracked but excluded from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDeltas {
    pub input: i64,
    pub output: i64,
    pub cache_read: i64,
    pub cache_write: i64,
    pub total: i64,
}

/// One immutable usage-log row, written once per applied event.
#[derive(Debug, Clone)]
pub struct NewUsageLogEntry {
    pub user_id: UserId,
    pub twitter_handle: String,
    pub token_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
}

/// A device-code row, with the owning handle joined in once approved.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceCodeRecord {
    pub code: String,
    pub user_id: Option<UserId>,
    pub twitter_handle: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub temp_api_key: Option<String>,
}

/// One hour of aggregate activity, for the leaderboard chart.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HourBucket {
    pub hour: DateTime<Utc>,
    pub tokens: i64,
    pub active_users: i64,
}

/// Aggregate activity over a trailing window.
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub window_tokens: i64,
    pub active_users: i64,
    pub graph: Vec<HourBucket>,
}

/// The authoritative store behind the ingestion pipeline and the rank
/// query service.
///
/// Counter increments must be atomic at the storage layer (single-statement
/// `x = x + delta`, never read-modify-write in application code) so
/// concurrent events for one principal always sum exactly.
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Look up a profile by its (already normalized) handle.
    async fn profile_by_handle(&self, handle: &str) -> Result<Option<ProfileRecord>>;

    /// Look up a profile by API key digest (CLI key verification).
    async fn profile_by_key_digest(&self, digest: &str) -> Result<Option<ProfileRecord>>;

    /// Create a profile on first sync.
    async fn create_profile(&self, profile: &NewProfile) -> Result<ProfileRecord>;

    /// Refresh profile metadata on a repeat sync.
    async fn touch_profile(&self, id: UserId, avatar_url: Option<&str>) -> Result<()>;

    /// Replace the stored API key digest (device-flow approval).
    async fn rotate_api_key(&self, id: UserId, digest: &str) -> Result<()>;

    /// Atomically add the event's deltas to the profile's counters and
    /// bump `last_active`.
    async fn increment_usage(&self, id: UserId, deltas: &UsageDeltas) -> Result<()>;

    /// Append one usage-log row. Write-once; the log is never mutated.
    async fn append_usage_log(&self, entry: &NewUsageLogEntry) -> Result<()>;

    /// Profiles ordered by ranking total DESC, creation order ASC.
    async fn top_profiles(&self, limit: i64) -> Result<Vec<ProfileRecord>>;

    /// Number of profiles with a strictly greater ranking total.
    async fn profiles_above(&self, total_tokens: i64) -> Result<i64>;

    /// Aggregate activity since `since`: total tokens, distinct active
    /// users, and hourly buckets for the chart (ascending by hour).
    async fn usage_stats(&self, since: DateTime<Utc>) -> Result<UsageStats>;

    /// Store a freshly issued device code.
    async fn insert_device_code(&self, code: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Fetch a device code with its owner's handle, if approved.
    async fn device_code(&self, code: &str) -> Result<Option<DeviceCodeRecord>>;

    /// Attach a user and a freshly minted key to a device code and mark
    /// it verified.
    async fn approve_device_code(&self, code: &str, user_id: UserId, api_key: &str) -> Result<()>;
}
