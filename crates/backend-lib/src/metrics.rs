// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_DESTROYED: &str = "room.destroyed";
pub const ROOM_EXPIRED: &str = "room.expired";
pub const JOIN_CODE_ISSUED: &str = "join_code.issued";
pub const JOIN_CODE_FAILED: &str = "join_code.failed";
pub const JOIN_CODE_COLLISIONS: &str = "join_code.collisions";
pub const PROTOCOL_ERRORS: &str = "protocol.errors";
