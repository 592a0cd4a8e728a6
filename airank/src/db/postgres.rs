//! PostgreSQL implementation of the durable store.

use super::errors::{DbError, Result};
use super::{
    DeviceCodeRecord, DurableStore, HourBucket, NewProfile, NewUsageLogEntry, ProfileRecord, UsageDeltas, UsageStats,
};
use crate::config::DatabaseConfig;
use crate::types::{abbrev_uuid, UserId};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

/// Durable store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool using the configured settings.
    pub async fn connect(config: &DatabaseConfig) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .min_connections(config.pool.min_connections)
            .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl DurableStore for PgStore {
    #[instrument(skip(self), err)]
    async fn profile_by_handle(&self, handle: &str) -> Result<Option<ProfileRecord>> {
        let profile = sqlx::query_as::<_, ProfileRecord>("SELECT * FROM profiles WHERE LOWER(twitter_handle) = LOWER($1)")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    #[instrument(skip_all, err)]
    async fn profile_by_key_digest(&self, digest: &str) -> Result<Option<ProfileRecord>> {
        let profile = sqlx::query_as::<_, ProfileRecord>("SELECT * FROM profiles WHERE api_key_hash = $1")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self, profile), fields(handle = %profile.twitter_handle), err)]
    async fn create_profile(&self, profile: &NewProfile) -> Result<ProfileRecord> {
        let created = sqlx::query_as::<_, ProfileRecord>(
            r#"
            INSERT INTO profiles (twitter_handle, avatar_url, api_key_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&profile.twitter_handle)
        .bind(&profile.avatar_url)
        .bind(&profile.api_key_digest)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self, avatar_url), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn touch_profile(&self, id: UserId, avatar_url: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE profiles SET avatar_url = COALESCE($2, avatar_url), last_active = NOW() WHERE id = $1")
            .bind(id)
            .bind(avatar_url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, digest), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn rotate_api_key(&self, id: UserId, digest: &str) -> Result<()> {
        let result = sqlx::query("UPDATE profiles SET api_key_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(digest)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // Single-statement relative update: safe under concurrent requests for
    // the same principal without any application-level locking.
    #[instrument(skip(self, deltas), fields(user_id = %abbrev_uuid(&id), tokens = deltas.total), err)]
    async fn increment_usage(&self, id: UserId, deltas: &UsageDeltas) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE profiles SET
                input_tokens = input_tokens + $2,
                output_tokens = output_tokens + $3,
                cache_read_tokens = cache_read_tokens + $4,
                cache_write_tokens = cache_write_tokens + $5,
                total_tokens = total_tokens + $6,
                last_active = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(deltas.input)
        .bind(deltas.output)
        .bind(deltas.cache_read)
        .bind(deltas.cache_write)
        .bind(deltas.total)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(handle = %entry.twitter_handle, tokens = entry.token_count), err)]
    async fn append_usage_log(&self, entry: &NewUsageLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_logs
                (user_id, twitter_handle, token_count, input_tokens, output_tokens, cache_read_tokens, cache_write_tokens)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.twitter_handle)
        .bind(entry.token_count)
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(entry.cache_read_tokens)
        .bind(entry.cache_write_tokens)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn top_profiles(&self, limit: i64) -> Result<Vec<ProfileRecord>> {
        let profiles = sqlx::query_as::<_, ProfileRecord>(
            "SELECT * FROM profiles ORDER BY total_tokens DESC, created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }

    #[instrument(skip(self), err)]
    async fn profiles_above(&self, total_tokens: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE total_tokens > $1")
            .bind(total_tokens)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self), err)]
    async fn usage_stats(&self, since: DateTime<Utc>) -> Result<UsageStats> {
        let graph = sqlx::query_as::<_, HourBucket>(
            r#"
            SELECT
                date_trunc('hour', recorded_at) AS hour,
                COALESCE(SUM(token_count), 0)::BIGINT AS tokens,
                COUNT(DISTINCT user_id) AS active_users
            FROM usage_logs
            WHERE recorded_at >= $1
            GROUP BY hour
            ORDER BY hour ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let window_tokens =
            sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(token_count), 0)::BIGINT FROM usage_logs WHERE recorded_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        // Summing per-hour distinct counts would overcount users active in
        // more than one hour, so the window-wide count is its own query.
        let active_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT user_id) FROM usage_logs WHERE recorded_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(UsageStats {
            window_tokens,
            active_users,
            graph,
        })
    }

    #[instrument(skip(self), err)]
    async fn insert_device_code(&self, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO device_codes (code, expires_at) VALUES ($1, $2)")
            .bind(code)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn device_code(&self, code: &str) -> Result<Option<DeviceCodeRecord>> {
        let record = sqlx::query_as::<_, DeviceCodeRecord>(
            r#"
            SELECT d.code, d.user_id, p.twitter_handle, d.expires_at, d.verified, d.temp_api_key
            FROM device_codes d
            LEFT JOIN profiles p ON p.id = d.user_id
            WHERE d.code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self, api_key), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn approve_device_code(&self, code: &str, user_id: UserId, api_key: &str) -> Result<()> {
        let result = sqlx::query("UPDATE device_codes SET verified = TRUE, user_id = $2, temp_api_key = $3 WHERE code = $1")
            .bind(code)
            .bind(user_id)
            .bind(api_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
