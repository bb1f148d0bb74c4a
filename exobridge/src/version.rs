//! Version information for exobridge.

/// Bridge version from Cargo.toml, reported in the startup and no-op events.
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");
