//! Identifiers and severities for the bridge's own events.
//!
//! The proxied child sends its events with whatever ids it likes; these are
//! only the events the bridge emits about itself, under its configured
//! originator id.

pub const STARTUP_INF_EID: u16 = 1;
pub const COMMAND_ERR_EID: u16 = 2;
pub const COMMAND_NOOP_INF_EID: u16 = 3;
pub const COMMAND_RESET_INF_EID: u16 = 4;
pub const LENGTH_ERR_EID: u16 = 5;
pub const TRANSPORT_ERR_EID: u16 = 6;
pub const SPAWN_ERR_EID: u16 = 7;
pub const DECODE_ERR_EID: u16 = 8;
pub const CHILD_STALE_INF_EID: u16 = 9;

// Severities, as the host event API encodes them.
pub const DEBUG: u16 = 1;
pub const INFORMATION: u16 = 2;
pub const ERROR: u16 = 3;
pub const CRITICAL: u16 = 4;
