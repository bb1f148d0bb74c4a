//! Wire protocol for the bridge's point-to-point RPC channel.
//!
//! The supervised child process cannot call the host executive's APIs
//! directly, so every call crosses this bridge as one request envelope and
//! (for most operations) one response envelope.
//!
//! - **protocol**: envelope types (`Request`, `Response`, `RetValue`)
//! - **codec**: binary encode/decode of complete frames

pub mod codec;
pub mod protocol;
