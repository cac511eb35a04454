// ============================
// signal-backend-lib/src/store/mod.rs
// ============================
//! Shared room store abstraction.
//!
//! All cross-connection coordination goes through a [`RoomStore`]. Keys follow
//! the layout shared with every other server instance:
//!
//! - `room:<roomId>`: set of member user ids, expiring with the room lifetime
//! - `join:<code>`: room id the code currently points at, short-lived
//!
//! Implementations must apply each operation atomically; callers never
//! read-modify-write across two calls.

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::AppError;

/// How often the in-process store drops expired keys
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn room_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

pub fn join_key(code: &str) -> String {
    format!("join:{code}")
}

/// Trait for shared room store backends
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Add `user_id` to the room and (re)set the room expiry, as one atomic unit
    async fn add_member(&self, room_id: &str, user_id: &str, ttl: Duration)
        -> Result<(), AppError>;

    /// Add `user_id` to a room that already exists, leaving its expiry alone.
    ///
    /// Returns `false` when the room does not exist.
    async fn join_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError>;

    /// Remove `user_id` from the room. Returns whether it was a member.
    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError>;

    /// Whether the room key is present and unexpired
    async fn room_exists(&self, room_id: &str) -> Result<bool, AppError>;

    /// Map `code` to `room_id` with `ttl`, only if the code is not already taken
    async fn reserve_code(&self, code: &str, room_id: &str, ttl: Duration)
        -> Result<bool, AppError>;

    /// Room currently mapped to `code`, if any
    async fn resolve_code(&self, code: &str) -> Result<Option<String>, AppError>;

    /// Connectivity probe
    async fn ping(&self) -> Result<(), AppError>;
}

/// Bounds every call on the wrapped store; an elapsed call fails with
/// [`AppError::StoreTimeout`].
pub struct TimeoutStore {
    inner: Arc<dyn RoomStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn RoomStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AppError>> + Send,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::StoreTimeout(self.limit.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl RoomStore for TimeoutStore {
    async fn add_member(
        &self,
        room_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.bounded(self.inner.add_member(room_id, user_id, ttl)).await
    }

    async fn join_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        self.bounded(self.inner.join_member(room_id, user_id)).await
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        self.bounded(self.inner.remove_member(room_id, user_id)).await
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool, AppError> {
        self.bounded(self.inner.room_exists(room_id)).await
    }

    async fn reserve_code(
        &self,
        code: &str,
        room_id: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        self.bounded(self.inner.reserve_code(code, room_id, ttl)).await
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<String>, AppError> {
        self.bounded(self.inner.resolve_code(code)).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.bounded(self.inner.ping()).await
    }
}

/// Build the store selected by `settings`, wrapped in the configured timeout.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn RoomStore>, AppError> {
    let inner: Arc<dyn RoomStore> = if settings.uses_memory_store() {
        tracing::info!("Using in-process room store");
        let store = MemoryStore::new();
        store.spawn_sweeper(MEMORY_SWEEP_INTERVAL);
        Arc::new(store)
    } else {
        connect_remote(settings.store_url.as_deref().unwrap_or_default()).await?
    };
    Ok(Arc::new(TimeoutStore::new(inner, settings.store_timeout())))
}

#[cfg(feature = "redis-store")]
async fn connect_remote(url: &str) -> Result<Arc<dyn RoomStore>, AppError> {
    tracing::info!("Connecting to shared room store");
    Ok(Arc::new(RedisStore::connect(url).await?))
}

#[cfg(not(feature = "redis-store"))]
async fn connect_remote(_url: &str) -> Result<Arc<dyn RoomStore>, AppError> {
    Err(AppError::Config(
        "store_url requires the `redis-store` feature".to_string(),
    ))
}
