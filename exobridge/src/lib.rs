//! exobridge: RPC bridge between a host flight executive and a supervised
//! child process.
//!
//! The bridge forks off one child, accepts one peer connection on a local
//! socket, and proxies the child's host service calls (executive, event
//! logging, time) over a length-prefixed binary envelope protocol. A
//! bounded receive timeout keeps the host run loop responsive whether or
//! not the child is alive.

pub mod bridge;
mod channel;
pub mod control;
mod dispatch;
pub mod events;
mod runloop;
pub mod services;
mod supervisor;
mod telemetry;
mod version;

pub use channel::{PairChannel, RecvOutcome, frame_codec};
pub use control::{ControlSender, control_channel};
pub use dispatch::{DispatchOutcome, dispatch};
pub use runloop::{Bridge, BridgeConfig, BridgeError};
pub use services::{
    EventServices, ExecutiveServices, HostServices, RUN_STATUS_RUN, TelemetrySink, TimeServices,
};
pub use supervisor::{ChildSpawner, ChildSupervisor, ExecSpawner, SpawnError};
pub use telemetry::{ChildRunState, TelemetryState};
pub use version::BRIDGE_VERSION;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with RUST_LOG and LOG_FORMAT support.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
