//! Test doubles for the storage seams and a helper to stand up the full
//! router over them, so the suite runs without Postgres or Redis.

use crate::aggregation::windows::WindowKeys;
use crate::aggregation::Engine;
use crate::cache::{CacheError, RankingCache, Result as CacheResult};
use crate::config::Config;
use crate::db::errors::{DbError, Result as DbResult};
use crate::db::{
    DeviceCodeRecord, DurableStore, HourBucket, NewProfile, NewUsageLogEntry, ProfileRecord, UsageDeltas, UsageStats,
};
use crate::types::UserId;
use crate::{build_router, AppState};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Service-role credential used by `test_app`.
pub const TEST_SERVICE_KEY: &str = "test_service_key";

#[derive(Clone)]
struct StoredDeviceCode {
    user_id: Option<UserId>,
    expires_at: DateTime<Utc>,
    verified: bool,
    temp_api_key: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    profiles: Vec<ProfileRecord>,
    logs: Vec<(NewUsageLogEntry, DateTime<Utc>)>,
    device_codes: HashMap<String, StoredDeviceCode>,
}

/// In-memory [`DurableStore`] with toggleable write failures.
///
/// Profiles get strictly increasing `created_at` stamps so ranking
/// tie-breaks are deterministic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    created_seq: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent counter increments and log appends fail, to
    /// exercise the durable failure path.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn usage_log_len(&self) -> usize {
        self.state.lock().unwrap().logs.len()
    }

    pub async fn add_profile(&self, handle: &str, digest: &str) -> ProfileRecord {
        self.create_profile(&NewProfile {
            twitter_handle: handle.to_string(),
            avatar_url: None,
            api_key_digest: digest.to_string(),
        })
        .await
        .unwrap()
    }

    pub async fn add_profile_without_key(&self, handle: &str) -> ProfileRecord {
        let created = self.add_profile(handle, "unused").await;
        let mut state = self.state.lock().unwrap();
        let stored = state.profiles.iter_mut().find(|profile| profile.id == created.id).unwrap();
        stored.api_key_hash = None;
        stored.clone()
    }

    fn next_created_at(&self) -> DateTime<Utc> {
        let seq = self.created_seq.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(1_700_000_000 + seq, 0).unwrap()
    }

    fn check_writes(&self) -> DbResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow!("injected write failure")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryStore {
    async fn profile_by_handle(&self, handle: &str) -> DbResult<Option<ProfileRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .find(|profile| profile.twitter_handle.eq_ignore_ascii_case(handle))
            .cloned())
    }

    async fn profile_by_key_digest(&self, digest: &str) -> DbResult<Option<ProfileRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .find(|profile| profile.api_key_hash.as_deref() == Some(digest))
            .cloned())
    }

    async fn create_profile(&self, profile: &NewProfile) -> DbResult<ProfileRecord> {
        let created_at = self.next_created_at();
        let mut state = self.state.lock().unwrap();

        if state
            .profiles
            .iter()
            .any(|existing| existing.twitter_handle.eq_ignore_ascii_case(&profile.twitter_handle))
        {
            return Err(DbError::UniqueViolation {
                constraint: Some("profiles_handle_lower_idx".to_string()),
                table: Some("profiles".to_string()),
                message: "duplicate handle".to_string(),
            });
        }

        let record = ProfileRecord {
            id: Uuid::new_v4(),
            twitter_handle: profile.twitter_handle.clone(),
            avatar_url: profile.avatar_url.clone(),
            api_key_hash: Some(profile.api_key_digest.clone()),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            total_tokens: 0,
            last_active: created_at,
            created_at,
        };
        state.profiles.push(record.clone());
        Ok(record)
    }

    async fn touch_profile(&self, id: UserId, avatar_url: Option<&str>) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let profile = state.profiles.iter_mut().find(|profile| profile.id == id).ok_or(DbError::NotFound)?;
        if let Some(avatar_url) = avatar_url {
            profile.avatar_url = Some(avatar_url.to_string());
        }
        profile.last_active = Utc::now();
        Ok(())
    }

    async fn rotate_api_key(&self, id: UserId, digest: &str) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let profile = state.profiles.iter_mut().find(|profile| profile.id == id).ok_or(DbError::NotFound)?;
        profile.api_key_hash = Some(digest.to_string());
        Ok(())
    }

    async fn increment_usage(&self, id: UserId, deltas: &UsageDeltas) -> DbResult<()> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        let profile = state.profiles.iter_mut().find(|profile| profile.id == id).ok_or(DbError::NotFound)?;

        profile.input_tokens += deltas.input;
        profile.output_tokens += deltas.output;
        profile.cache_read_tokens += deltas.cache_read;
        profile.cache_write_tokens += deltas.cache_write;
        profile.total_tokens += deltas.total;
        profile.last_active = Utc::now();
        Ok(())
    }

    async fn append_usage_log(&self, entry: &NewUsageLogEntry) -> DbResult<()> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.logs.push((entry.clone(), Utc::now()));
        Ok(())
    }

    async fn top_profiles(&self, limit: i64) -> DbResult<Vec<ProfileRecord>> {
        let state = self.state.lock().unwrap();
        let mut profiles = state.profiles.clone();
        profiles.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens).then(a.created_at.cmp(&b.created_at)));
        profiles.truncate(limit.max(0) as usize);
        Ok(profiles)
    }

    async fn profiles_above(&self, total_tokens: i64) -> DbResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.profiles.iter().filter(|profile| profile.total_tokens > total_tokens).count() as i64)
    }

    async fn usage_stats(&self, since: DateTime<Utc>) -> DbResult<UsageStats> {
        let state = self.state.lock().unwrap();

        let mut window_tokens = 0i64;
        let mut users: HashSet<UserId> = HashSet::new();
        let mut hours: BTreeMap<i64, (i64, HashSet<UserId>)> = BTreeMap::new();

        for (entry, at) in &state.logs {
            if *at < since {
                continue;
            }
            window_tokens += entry.token_count;
            users.insert(entry.user_id);

            let hour = at.timestamp() / 3600 * 3600;
            let slot = hours.entry(hour).or_default();
            slot.0 += entry.token_count;
            slot.1.insert(entry.user_id);
        }

        Ok(UsageStats {
            window_tokens,
            active_users: users.len() as i64,
            graph: hours
                .into_iter()
                .map(|(hour, (tokens, hour_users))| HourBucket {
                    hour: DateTime::from_timestamp(hour, 0).unwrap(),
                    tokens,
                    active_users: hour_users.len() as i64,
                })
                .collect(),
        })
    }

    async fn insert_device_code(&self, code: &str, expires_at: DateTime<Utc>) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.device_codes.insert(
            code.to_string(),
            StoredDeviceCode {
                user_id: None,
                expires_at,
                verified: false,
                temp_api_key: None,
            },
        );
        Ok(())
    }

    async fn device_code(&self, code: &str) -> DbResult<Option<DeviceCodeRecord>> {
        let state = self.state.lock().unwrap();
        let Some(stored) = state.device_codes.get(code) else {
            return Ok(None);
        };

        let twitter_handle = stored.user_id.and_then(|user_id| {
            state
                .profiles
                .iter()
                .find(|profile| profile.id == user_id)
                .map(|profile| profile.twitter_handle.clone())
        });

        Ok(Some(DeviceCodeRecord {
            code: code.to_string(),
            user_id: stored.user_id,
            twitter_handle,
            expires_at: stored.expires_at,
            verified: stored.verified,
            temp_api_key: stored.temp_api_key.clone(),
        }))
    }

    async fn approve_device_code(&self, code: &str, user_id: UserId, api_key: &str) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.device_codes.get_mut(code).ok_or(DbError::NotFound)?;
        stored.verified = true;
        stored.user_id = Some(user_id);
        stored.temp_api_key = Some(api_key.to_string());
        Ok(())
    }
}

/// [`RankingCache`] that fails every call, for degraded-cache tests.
pub struct FailingCache;

fn injected() -> CacheError {
    CacheError::Other("injected cache failure".to_string())
}

#[async_trait::async_trait]
impl RankingCache for FailingCache {
    async fn bump_window_scores(&self, _handle: &str, _tokens: i64, _windows: &WindowKeys) -> CacheResult<()> {
        Err(injected())
    }

    async fn track_throughput(&self, _epoch_second: i64, _tokens: i64, _retain_for: Duration) -> CacheResult<i64> {
        Err(injected())
    }

    async fn peak_throughput(&self) -> CacheResult<i64> {
        Err(injected())
    }

    async fn promote_peak(&self, _candidate: i64) -> CacheResult<()> {
        Err(injected())
    }
}

/// Stand up the full router over the given stores.
pub async fn test_app(durable: Arc<MemoryStore>, cache: Arc<dyn RankingCache>) -> axum_test::TestServer {
    let mut config = Config::default();
    config.auth.service_key = Some(TEST_SERVICE_KEY.to_string());
    config.cache.command_timeout = Duration::from_millis(250);

    let engine = Arc::new(Engine::new(
        durable.clone(),
        cache.clone(),
        config.cache.command_timeout,
        config.cache.throughput_window,
    ));

    let state = AppState::builder()
        .durable(durable)
        .cache(cache)
        .engine(engine)
        .config(config)
        .build();

    let router = build_router(state).expect("failed to build router");
    axum_test::TestServer::new(router).expect("failed to create test server")
}
