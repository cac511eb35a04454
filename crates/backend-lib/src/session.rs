// ============================
// crates/backend-lib/src/session.rs
// ============================
//! Room sessions and join code rotation.
//!
//! A session binds one connection to one room membership. Host sessions
//! (opened by `create`) own a rotation task that publishes a fresh join code
//! every interval until the session ends; guest sessions (opened by `join`)
//! only hold the membership.
//!
//! The rotation task is tied to the session by a `CancellationToken`. Every
//! store round-trip and every outbound send races that token, so once
//! [`RoomSession::terminate`] returns nothing more is emitted for the room.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use signal_common::ServerMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ProtocolError};
use crate::join_code::JoinCodeIssuer;
use crate::metrics::{ROOM_CREATED, ROOM_EXPIRED, ROOM_JOINED};
use crate::store::RoomStore;
use crate::AppState;

/// One active room membership held by a connection
pub struct RoomSession {
    room_id: String,
    user_id: String,
    token: CancellationToken,
    rotation: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Register the room, acknowledge with `joined`, then start rotating codes.
    ///
    /// The acknowledgment is queued before the rotation task exists, so it
    /// always precedes the first `joinCode`.
    pub async fn open_host(
        state: &AppState,
        room_id: String,
        user_id: String,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Self, AppError> {
        state
            .store
            .add_member(&room_id, &user_id, state.settings.room_ttl())
            .await?;

        acknowledge(state.store.as_ref(), &outbound, &room_id, &user_id).await?;

        counter!(ROOM_CREATED).increment(1);
        tracing::info!(room_id = %room_id, user_id = %user_id, "Room created");

        let token = CancellationToken::new();
        let rotation = Rotation {
            store: state.store.clone(),
            issuer: state.issuer.clone(),
            interval: state.settings.rotation_interval(),
            room_id: room_id.clone(),
            outbound,
            token: token.clone(),
        };
        let handle = tokio::spawn(rotation.run());

        Ok(Self {
            room_id,
            user_id,
            token,
            rotation: Some(handle),
        })
    }

    /// Enter the room currently advertised under `join_code`.
    pub async fn open_guest(
        state: &AppState,
        join_code: &str,
        user_id: String,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Self, AppError> {
        let room_id = state
            .store
            .resolve_code(join_code)
            .await?
            .ok_or(ProtocolError::UnknownJoinCode)?;

        // The code can outlive its room by the grace period
        if !state.store.join_member(&room_id, &user_id).await? {
            return Err(ProtocolError::UnknownJoinCode.into());
        }

        acknowledge(state.store.as_ref(), &outbound, &room_id, &user_id).await?;

        counter!(ROOM_JOINED).increment(1);
        tracing::info!(room_id = %room_id, user_id = %user_id, "Joined room by code");

        Ok(Self {
            room_id,
            user_id,
            token: CancellationToken::new(),
            rotation: None,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// False once the session was terminated or its room expired
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn matches(&self, room_id: &str, user_id: &str) -> bool {
        self.room_id == room_id && self.user_id == user_id
    }

    /// Stop rotation and wait until the task is gone.
    pub async fn terminate(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.rotation.take() {
            if let Err(e) = handle.await {
                tracing::error!(room_id = %self.room_id, error = %e, "Rotation task failed");
            }
        }
    }

    /// Terminate and drop the membership. Returns whether the user was still
    /// a member.
    pub async fn end(mut self, store: &dyn RoomStore) -> Result<bool, AppError> {
        self.terminate().await;
        store.remove_member(&self.room_id, &self.user_id).await
    }
}

/// Queue `joined`. If the connection is already gone no session will exist to
/// clean up, so the fresh membership is dropped here.
async fn acknowledge(
    store: &dyn RoomStore,
    outbound: &mpsc::Sender<ServerMessage>,
    room_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let joined = ServerMessage::Joined {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
    };
    if let Err(e) = outbound.send(joined).await {
        if let Err(err) = store.remove_member(room_id, user_id).await {
            tracing::warn!(room_id = %room_id, user_id = %user_id, error = %err, "Failed to roll back membership");
        }
        return Err(e.into());
    }
    Ok(())
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Outcome of one rotation tick
enum Tick {
    Frame(ServerMessage),
    Expired,
}

struct Rotation {
    store: Arc<dyn RoomStore>,
    issuer: JoinCodeIssuer,
    interval: Duration,
    room_id: String,
    outbound: mpsc::Sender<ServerMessage>,
    token: CancellationToken,
}

impl Rotation {
    async fn run(self) {
        let mut ticker = time::interval(self.interval);
        // A slow cycle drops the ticks it overlapped instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let tick = tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                tick = self.cycle() => tick,
            };

            let frame = match tick {
                Tick::Frame(frame) => frame,
                Tick::Expired => {
                    counter!(ROOM_EXPIRED).increment(1);
                    tracing::info!(room_id = %self.room_id, "Room expired, stopping rotation");
                    self.token.cancel();
                    let _ = self
                        .outbound
                        .send(ServerMessage::RoomExpired {
                            room_id: self.room_id.clone(),
                        })
                        .await;
                    break;
                },
            };

            if !self.deliver(frame).await {
                break;
            }
        }

        tracing::debug!(room_id = %self.room_id, "Rotation stopped");
    }

    /// Send unless the session ends first. Returns whether rotation may go on.
    async fn deliver(&self, frame: ServerMessage) -> bool {
        tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            sent = self.outbound.send(frame) => {
                if sent.is_err() {
                    // Socket is gone; nothing left to rotate for
                    self.token.cancel();
                    return false;
                }
                true
            },
        }
    }

    async fn cycle(&self) -> Tick {
        match self.store.room_exists(&self.room_id).await {
            Ok(true) => {},
            Ok(false) => return Tick::Expired,
            Err(e) => return Tick::Frame(error_frame(&self.room_id, &e)),
        }

        match self.issuer.issue(&self.room_id).await {
            Ok(join_code) => Tick::Frame(ServerMessage::JoinCode {
                join_code,
                ttl: self.interval.as_secs(),
            }),
            Err(e) => Tick::Frame(error_frame(&self.room_id, &e)),
        }
    }
}

fn error_frame(room_id: &str, err: &AppError) -> ServerMessage {
    tracing::warn!(room_id, error = %err, "Join code rotation failed");
    ServerMessage::error(err.error_code(), err.sanitized_message())
}
