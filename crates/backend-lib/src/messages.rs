// ================
// crates/backend-lib/src/messages.rs
// ================
//! Decoding of inbound frames into protocol messages.
//!
//! Frames are inspected in two steps so every failure maps onto a precise
//! [`ProtocolError`]: first the JSON envelope and its `type` discriminator,
//! then the typed payload.

use serde_json::Value;
use signal_common::{ClientMessage, CLIENT_MESSAGE_TYPES};

use crate::error::ProtocolError;
use crate::validation;

/// Parse and validate one text frame
pub fn decode_client_frame(text: &str, code_length: usize) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !CLIENT_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    let msg: ClientMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage {
            kind,
            reason: e.to_string(),
        })?;

    validation::validate_client_message(&msg, code_length)?;
    Ok(msg)
}
