//! Redis implementation of the shared room store.
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{join_key, room_key, RoomStore};
use crate::error::AppError;

/// SADD only when the room key is still there, so a join can never create a
/// room without an expiry.
static JOIN_EXISTING: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return redis.call('SADD', KEYS[1], ARGV[1])
        end
        return -1
        ",
    )
});

/// Redis-backed `RoomStore` over a reconnecting connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RoomStore for RedisStore {
    async fn add_member(
        &self,
        room_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let key = room_key(room_id);
        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(user_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn join_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let added: i64 = JOIN_EXISTING
            .key(room_key(room_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(added >= 0)
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(room_key(room_id), user_id).await?;
        Ok(removed > 0)
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(room_key(room_id)).await?;
        Ok(exists)
    }

    async fn reserve_code(
        &self,
        code: &str,
        room_id: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        // SET NX replies OK when written and nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(join_key(code))
            .arg(room_id)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let room: Option<String> = conn.get(join_key(code)).await?;
        Ok(room)
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
