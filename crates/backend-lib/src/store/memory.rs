//! In-process room store.
//!
//! Backed by `DashMap`s keyed with the shared key layout. Expiry is evaluated
//! lazily on access and swept by [`MemoryStore::purge_expired`]. Deadlines use
//! the tokio clock so paused-time tests see keys expire.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{join_key, room_key, RoomStore};
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory implementation of the `RoomStore` trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rooms: Arc<DashMap<String, Expiring<HashSet<String>>>>,
    codes: Arc<DashMap<String, Expiring<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired room and join code. Returns how many keys went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.rooms.retain(|_, room| {
            let live = room.is_live(now);
            purged += usize::from(!live);
            live
        });
        self.codes.retain(|_, code| {
            let live = code.is_live(now);
            purged += usize::from(!live);
            live
        });
        purged
    }

    /// Periodically purge expired keys for as long as the runtime lives
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired room store keys");
                }
            }
        })
    }

    /// Members of a live room, for inspection in tests and diagnostics
    pub fn members(&self, room_id: &str) -> Vec<String> {
        let now = Instant::now();
        self.rooms
            .get(&room_key(room_id))
            .filter(|room| room.is_live(now))
            .map(|room| {
                let mut members: Vec<String> = room.value.iter().cloned().collect();
                members.sort();
                members
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn add_member(
        &self,
        room_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let now = Instant::now();
        let mut room = self
            .rooms
            .entry(room_key(room_id))
            .or_insert_with(|| Expiring::new(HashSet::new(), ttl));
        if !room.is_live(now) {
            room.value.clear();
        }
        room.value.insert(user_id.to_string());
        room.expires_at = now + ttl;
        Ok(())
    }

    async fn join_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.rooms.entry(room_key(room_id)) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.remove();
                    return Ok(false);
                }
                occupied.get_mut().value.insert(user_id.to_string());
                Ok(true)
            },
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.rooms.entry(room_key(room_id)) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.remove();
                    return Ok(false);
                }
                let removed = occupied.get_mut().value.remove(user_id);
                // Empty sets do not exist
                if occupied.get().value.is_empty() {
                    occupied.remove();
                }
                Ok(removed)
            },
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        let key = room_key(room_id);
        let live = self
            .rooms
            .get(&key)
            .map(|room| room.is_live(now) && !room.value.is_empty());
        match live {
            Some(true) => Ok(true),
            Some(false) => {
                self.rooms.remove_if(&key, |_, room| !room.is_live(now));
                Ok(false)
            },
            None => Ok(false),
        }
    }

    async fn reserve_code(
        &self,
        code: &str,
        room_id: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.codes.entry(join_key(code)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(Expiring::new(room_id.to_string(), ttl));
                Ok(true)
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Expiring::new(room_id.to_string(), ttl));
                Ok(true)
            },
        }
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<String>, AppError> {
        let now = Instant::now();
        Ok(self
            .codes
            .get(&join_key(code))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
