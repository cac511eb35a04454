// ============================
// crates/backend-lib/src/validation.rs
// ============================
//! Message validation module.

use std::sync::LazyLock;

use regex::Regex;
use signal_common::ClientMessage;

use crate::error::ProtocolError;

const MAX_ID_LENGTH: usize = 128;

// Room and user ids end up inside store keys
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:-]+$").expect("valid id pattern"));
static CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid code pattern"));

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ProtocolError>;

/// Validate a room or user id
pub fn validate_id<'a>(field: &'static str, value: &'a str) -> ValidationResult<&'a str> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(ProtocolError::InvalidField {
            field,
            reason: format!("must be at most {MAX_ID_LENGTH} characters"),
        });
    }
    if !ID_REGEX.is_match(value) {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "may only contain letters, digits, '_', '.', ':' and '-'".to_string(),
        });
    }
    Ok(value)
}

/// Validate a join code against the configured length
pub fn validate_join_code(code: &str, length: usize) -> ValidationResult<&str> {
    if code.len() != length || !CODE_REGEX.is_match(code) {
        return Err(ProtocolError::InvalidField {
            field: "joinCode",
            reason: format!("must be exactly {length} digits"),
        });
    }
    Ok(code)
}

/// Validate a decoded client message
pub fn validate_client_message(msg: &ClientMessage, code_length: usize) -> ValidationResult<()> {
    match msg {
        ClientMessage::Create { room_id, user_id } | ClientMessage::Destroy { room_id, user_id } => {
            validate_id("roomId", room_id)?;
            validate_id("userId", user_id)?;
        },
        ClientMessage::Join { join_code, user_id } => {
            validate_join_code(join_code, code_length)?;
            validate_id("userId", user_id)?;
        },
        ClientMessage::Ping => {},
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("roomId", "r1").is_ok());
        assert!(validate_id("roomId", "3f0c9a7e-1b2d-4c55-9e0a-08c1d2e3f4a5").is_ok());
        assert!(validate_id("roomId", "").is_err());
        assert!(validate_id("roomId", "room 1").is_err());
        assert!(validate_id("roomId", "room:*").is_err());
        assert!(validate_id("roomId", &"a".repeat(MAX_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_join_code() {
        assert!(validate_join_code("004211", 6).is_ok());
        assert!(validate_join_code("04211", 6).is_err());
        assert!(validate_join_code("04211a", 6).is_err());
        assert!(validate_join_code("0042110", 6).is_err());
    }

    #[test]
    fn test_validate_client_message() {
        let msg = ClientMessage::Create {
            room_id: "r1".to_string(),
            user_id: "".to_string(),
        };
        let err = validate_client_message(&msg, 6).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidField {
                field: "userId",
                reason: "must not be empty".to_string()
            }
        );
        assert!(validate_client_message(&ClientMessage::Ping, 6).is_ok());
    }
}
