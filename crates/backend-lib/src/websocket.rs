// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! The `ConnectionHandler` is instantiated per connection and drives the room
//! session state machine for a single client:
//!
//! ```text
//! UNINITIALIZED --create/join--> ACTIVE --destroy/close/expiry--> TERMINATED
//! ```
//!
//! Every failure is caught here and turned into an `error` frame; the socket
//! is never closed because of a bad message. On disconnect, [`shutdown`]
//! stops rotation and removes the membership on a best-effort basis.
//!
//! [`shutdown`]: ConnectionHandler::shutdown

use metrics::counter;
use signal_common::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AppError, ProtocolError};
use crate::messages::decode_client_frame;
use crate::metrics::{PROTOCOL_ERRORS, ROOM_DESTROYED};
use crate::session::RoomSession;
use crate::AppState;

/// WebSocket handler for processing messages
pub struct ConnectionHandler {
    state: AppState,
    connection_id: String,
    outbound: mpsc::Sender<ServerMessage>,
    session: Option<RoomSession>,
}

impl ConnectionHandler {
    pub fn new(state: AppState, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4().to_string(),
            outbound,
            session: None,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The live session, if any. Sessions that ended on their own (room
    /// expiry, socket gone) are reaped here.
    pub fn session(&mut self) -> Option<&RoomSession> {
        if self.session.as_ref().is_some_and(|s| !s.is_live()) {
            if let Some(ended) = self.session.take() {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    room_id = %ended.room_id(),
                    "Reaped ended room session"
                );
            }
        }
        self.session.as_ref()
    }

    /// Handle one inbound text frame. Returns `Err` only when the outbound
    /// side is gone.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), AppError> {
        let result = match decode_client_frame(text, self.state.issuer.code_length()) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => self.report(e).await,
            Err(e) => Err(e),
        }
    }

    /// Binary frames carry the same JSON protocol as text frames
    pub async fn handle_binary(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_text(text).await,
            Err(e) => {
                let err = ProtocolError::InvalidJson(format!("frame is not UTF-8: {e}"));
                self.report(err.into()).await
            },
        }
    }

    /// Dispatch a decoded message
    pub async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), AppError> {
        tracing::debug!(connection_id = %self.connection_id, kind = msg.kind(), "Handling message");
        match msg {
            ClientMessage::Create { room_id, user_id } => self.create(room_id, user_id).await,
            ClientMessage::Join { join_code, user_id } => self.join(&join_code, user_id).await,
            ClientMessage::Destroy { room_id, user_id } => self.destroy(room_id, user_id).await,
            ClientMessage::Ping => Ok(self.outbound.send(ServerMessage::Pong).await?),
        }
    }

    async fn create(&mut self, room_id: String, user_id: String) -> Result<(), AppError> {
        if self.session().is_some() {
            return Err(ProtocolError::SessionActive.into());
        }
        let session =
            RoomSession::open_host(&self.state, room_id, user_id, self.outbound.clone()).await?;
        self.session = Some(session);
        Ok(())
    }

    async fn join(&mut self, join_code: &str, user_id: String) -> Result<(), AppError> {
        if self.session().is_some() {
            return Err(ProtocolError::SessionActive.into());
        }
        let session =
            RoomSession::open_guest(&self.state, join_code, user_id, self.outbound.clone())
                .await?;
        self.session = Some(session);
        Ok(())
    }

    /// Leave the room. Without a live session this only drops the membership,
    /// so repeating `destroy` is harmless.
    async fn destroy(&mut self, room_id: String, user_id: String) -> Result<(), AppError> {
        match self.session() {
            Some(session) if !session.matches(&room_id, &user_id) => {
                return Err(ProtocolError::SessionMismatch.into());
            },
            _ => {},
        }

        match self.session.take() {
            Some(session) => {
                session.end(self.state.store.as_ref()).await?;
            },
            None => {
                self.state.store.remove_member(&room_id, &user_id).await?;
            },
        }

        counter!(ROOM_DESTROYED).increment(1);
        tracing::info!(
            connection_id = %self.connection_id,
            room_id = %room_id,
            user_id = %user_id,
            "Room membership destroyed"
        );

        self.outbound
            .send(ServerMessage::Destroyed { room_id, user_id })
            .await?;
        Ok(())
    }

    /// Report a recoverable failure to the client
    async fn report(&self, err: AppError) -> Result<(), AppError> {
        if matches!(err, AppError::Protocol(_)) {
            counter!(PROTOCOL_ERRORS).increment(1);
        }
        tracing::warn!(
            connection_id = %self.connection_id,
            code = err.error_code(),
            error = %err,
            "Request failed"
        );
        let frame = ServerMessage::error(err.error_code(), err.sanitized_message());
        self.outbound
            .send(frame)
            .await
            .map_err(|_| AppError::TransportClosed)
    }

    /// Connection is gone: stop rotation and drop the membership.
    ///
    /// Never fails; store errors are only logged.
    pub async fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let room_id = session.room_id().to_string();
        let user_id = session.user_id().to_string();
        match session.end(self.state.store.as_ref()).await {
            Ok(_) => tracing::info!(
                connection_id = %self.connection_id,
                room_id = %room_id,
                user_id = %user_id,
                "Cleaned up room membership on disconnect"
            ),
            Err(e) => tracing::warn!(
                connection_id = %self.connection_id,
                room_id = %room_id,
                user_id = %user_id,
                error = %e,
                "Membership cleanup failed on disconnect"
            ),
        }
    }
}
