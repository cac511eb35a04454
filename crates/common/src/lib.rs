// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between browser sessions and the signaling server.
//! This module defines the WebSocket protocol messages exchanged on `/ws`.

use serde::{Deserialize, Serialize};

/// Discriminator values accepted from clients, in wire spelling.
pub const CLIENT_MESSAGE_TYPES: [&str; 4] = ["create", "destroy", "join", "ping"];

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open a room and start receiving rotating join codes
    /// # Fields
    /// * `room_id` - Caller-chosen room identity, unique per logical session
    /// * `user_id` - Identity of the creating user
    #[serde(rename_all = "camelCase")]
    Create { room_id: String, user_id: String },
    /// Leave a room and stop the join code stream
    /// # Fields
    /// * `room_id` - Room to leave
    /// * `user_id` - Member to remove
    #[serde(rename_all = "camelCase")]
    Destroy { room_id: String, user_id: String },
    /// Join the room currently advertised under a join code
    /// # Fields
    /// * `join_code` - Code shown on the creating session
    /// * `user_id` - Identity of the joining user
    #[serde(rename_all = "camelCase")]
    Join { join_code: String, user_id: String },
    /// Application-level heartbeat
    Ping,
}

impl ClientMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Create { .. } => "create",
            ClientMessage::Destroy { .. } => "destroy",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Ping => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Room membership acknowledged
    #[serde(rename_all = "camelCase")]
    Joined { room_id: String, user_id: String },
    /// Currently valid join code for the room
    #[serde(rename_all = "camelCase")]
    JoinCode {
        join_code: String,
        /// Seconds until the next rotation
        ttl: u64,
    },
    /// Room membership removal acknowledged
    #[serde(rename_all = "camelCase")]
    Destroyed { room_id: String, user_id: String },
    /// The room outlived its lifetime; no more join codes follow
    #[serde(rename_all = "camelCase")]
    RoomExpired { room_id: String },
    /// Reply to `ping`
    Pong,
    /// Protocol, generation or store failure
    Error {
        message: String,
        /// Stable machine-readable error code
        code: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            code: code.into(),
        }
    }
}
