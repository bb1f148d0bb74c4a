//! The bridge run loop: a single-threaded cycle that polls the control
//! plane, services one RPC receive attempt, and walks the phase machine
//! from `Running` through `Draining` to `Terminated`.
//!
//! Every iteration is bounded by the receive timeout, so the loop is always
//! responsive to the host executive even with no child attached. Only two
//! things end it: the executive's run-status verdict (after a fixed drain of
//! late traffic) and an explicit exit request from the child.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::bridge::codec::{decode_request, encode_response};
use crate::channel::{PairChannel, RecvOutcome};
use crate::control::{self, CommandFrame, ControlMessage};
use crate::dispatch::{DispatchOutcome, dispatch};
use crate::events;
use crate::services::{HostServices, RUN_STATUS_RUN};
use crate::supervisor::{ChildSpawner, ChildSupervisor, ExecSpawner};
use crate::telemetry::{ChildRunState, TelemetryState};
use crate::version::BRIDGE_VERSION;

/// Telemetry error code for an orderly peer close, which yields no errno of
/// its own. ECONNRESET, the closest wire-level equivalent.
const PEER_CLOSED_CODE: i32 = 104;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The local endpoint could not be established. Unlike a peer fault,
    /// this is fatal: without a listener there is nothing to bridge.
    #[error("transport channel error: {0}")]
    Channel(#[from] io::Error),
}

/// Where the run loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Stop requested; this many service cycles remain for late traffic.
    Draining(u32),
    Terminated,
}

/// Run-loop configuration. Defaults match the flight profile; tests shrink
/// the timings.
pub struct BridgeConfig {
    socket_path: PathBuf,
    child_program: String,
    child_args: Vec<String>,
    recv_timeout: Duration,
    drain_cycles: u32,
    origin_id: u32,
    stale_after_timeouts: u32,
    spawner: Arc<dyn ChildSpawner>,
}

impl BridgeConfig {
    pub fn new(socket_path: impl Into<PathBuf>, child_program: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            child_program: child_program.into(),
            child_args: Vec::new(),
            recv_timeout: Duration::from_millis(500),
            drain_cycles: 6,
            origin_id: 88,
            stale_after_timeouts: 20,
            spawner: Arc::new(ExecSpawner),
        }
    }

    pub fn with_child_args(mut self, args: Vec<String>) -> Self {
        self.child_args = args;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_drain_cycles(mut self, cycles: u32) -> Self {
        self.drain_cycles = cycles;
        self
    }

    pub fn with_origin_id(mut self, origin_id: u32) -> Self {
        self.origin_id = origin_id;
        self
    }

    pub fn with_stale_after_timeouts(mut self, timeouts: u32) -> Self {
        self.stale_after_timeouts = timeouts;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ChildSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

/// The bridge itself. Owns the channel, the child, the telemetry record,
/// and the host service handles for its whole lifetime.
pub struct Bridge {
    config: BridgeConfig,
    services: HostServices,
    telemetry: TelemetryState,
    supervisor: ChildSupervisor,
    control_rx: UnboundedReceiver<ControlMessage>,
    phase: Phase,
    run_status: u32,
    consecutive_timeouts: u32,
    graceful_exit: bool,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        services: HostServices,
        control_rx: UnboundedReceiver<ControlMessage>,
    ) -> Self {
        let supervisor = ChildSupervisor::new(config.spawner.clone());
        Self {
            config,
            services,
            telemetry: TelemetryState::new(),
            supervisor,
            control_rx,
            phase: Phase::Running,
            run_status: RUN_STATUS_RUN,
            consecutive_timeouts: 0,
            graceful_exit: false,
        }
    }

    /// Initialize, then loop until terminated. Returns the final run status
    /// handed to the executive's exit routine.
    pub async fn run(mut self) -> Result<u32, BridgeError> {
        self.services.executive.register_app();

        let mut channel = PairChannel::listen(&self.config.socket_path)?;

        if let Err(e) = self
            .supervisor
            .spawn(&self.config.child_program, &self.config.child_args)
        {
            // Non-fatal: keep the loop alive for ground visibility.
            self.telemetry.record_spawn_error(e.os_code());
            tracing::error!(error = %e, program = %self.config.child_program, "child spawn failed");
            self.send_bridge_event(
                events::SPAWN_ERR_EID,
                events::ERROR,
                &format!("Failed to start child '{}': {}", self.config.child_program, e),
            );
        }

        self.send_bridge_event(
            events::STARTUP_INF_EID,
            events::INFORMATION,
            &format!("Bridge initialized, version {}", BRIDGE_VERSION),
        );

        loop {
            match self.phase {
                Phase::Running => {
                    self.poll_control();

                    let mut status = self.run_status;
                    let keep_running = self.services.executive.run_loop(&mut status);
                    self.run_status = status;
                    if !keep_running {
                        tracing::info!(
                            drain_cycles = self.config.drain_cycles,
                            "stop requested, draining"
                        );
                        self.phase = Phase::Draining(self.config.drain_cycles);
                        // The drain window starts on the next iteration; the
                        // control plane is no longer polled.
                        continue;
                    }
                }
                Phase::Draining(0) => {
                    self.phase = Phase::Terminated;
                    break;
                }
                Phase::Draining(remaining) => {
                    self.phase = Phase::Draining(remaining - 1);
                }
                Phase::Terminated => break,
            }

            if self.service_rpc(&mut channel).await {
                self.phase = Phase::Terminated;
                break;
            }
        }

        self.shutdown(&mut channel).await;
        Ok(self.run_status)
    }

    /// One bounded receive attempt plus whatever it yields. Returns `true`
    /// when the child asked to exit.
    async fn service_rpc(&mut self, channel: &mut PairChannel) -> bool {
        match channel.recv(self.config.recv_timeout).await {
            RecvOutcome::Frame(frame) => {
                self.consecutive_timeouts = 0;
                // Anything received counts as child activity, decodable or
                // not: a garbled frame still came from a live peer.
                self.telemetry.record_call();
                match decode_request(&frame) {
                    Ok(request) => return self.handle_request(channel, request).await,
                    Err(e) => {
                        tracing::warn!(error = %e, len = frame.len(), "undecodable frame dropped");
                        self.send_bridge_event(
                            events::DECODE_ERR_EID,
                            events::ERROR,
                            &format!("Dropped undecodable frame: {e}"),
                        );
                    }
                }
            }
            RecvOutcome::TimedOut => {
                self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
                self.note_possible_staleness();
            }
            RecvOutcome::Disconnected => {
                self.telemetry.record_transport_error(PEER_CLOSED_CODE);
                tracing::warn!("peer disconnected");
                self.send_bridge_event(
                    events::TRANSPORT_ERR_EID,
                    events::ERROR,
                    "Child connection closed",
                );
            }
            RecvOutcome::Failed(e) => {
                self.telemetry
                    .record_transport_error(e.raw_os_error().unwrap_or(-1));
                tracing::error!(error = %e, "transport receive failed");
                self.send_bridge_event(
                    events::TRANSPORT_ERR_EID,
                    events::ERROR,
                    &format!("Transport receive failed: {e}"),
                );
            }
        }
        false
    }

    async fn handle_request(
        &mut self,
        channel: &mut PairChannel,
        request: crate::bridge::protocol::Request,
    ) -> bool {
        match dispatch(request, &mut self.services, &mut self.telemetry) {
            DispatchOutcome::Reply(response) => {
                if let Err(e) = channel.send(encode_response(&response)).await {
                    self.telemetry
                        .record_transport_error(e.raw_os_error().unwrap_or(-1));
                    tracing::error!(error = %e, "transport send failed");
                    self.send_bridge_event(
                        events::TRANSPORT_ERR_EID,
                        events::ERROR,
                        &format!("Transport send failed: {e}"),
                    );
                }
                false
            }
            DispatchOutcome::NoReply => false,
            DispatchOutcome::Terminate(exit_status) => {
                self.run_status = exit_status;
                self.graceful_exit = true;
                true
            }
        }
    }

    /// Flag a child that has been attached but silent too long. Fires once
    /// per silence, since any received frame puts the state back to running.
    fn note_possible_staleness(&mut self) {
        if self.supervisor.is_attached()
            && self.telemetry.child_run_state() == ChildRunState::Running
            && self.consecutive_timeouts >= self.config.stale_after_timeouts
        {
            self.telemetry.set_child_state(ChildRunState::TimedOut);
            tracing::warn!(
                timeouts = self.consecutive_timeouts,
                "child silent past staleness threshold"
            );
            self.send_bridge_event(
                events::CHILD_STALE_INF_EID,
                events::INFORMATION,
                "Child stopped responding",
            );
        }
    }

    /// Non-blocking poll of the control plane: at most one message per loop
    /// iteration, so a command burst cannot starve the RPC side.
    fn poll_control(&mut self) {
        if let Ok(message) = self.control_rx.try_recv() {
            self.handle_control(message);
        }
    }

    fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Command(frame) => self.handle_command(frame),
            ControlMessage::RequestStatus => {
                self.services.telemetry_sink.emit(&self.telemetry);
            }
        }
    }

    fn handle_command(&mut self, frame: CommandFrame) {
        let Some(expected) = control::expected_length(frame.code) else {
            self.telemetry.record_command_error();
            tracing::warn!(code = frame.code, "unrecognized command code");
            self.send_bridge_event(
                events::COMMAND_ERR_EID,
                events::ERROR,
                &format!("Invalid ground command code: CC = {}", frame.code),
            );
            return;
        };

        if frame.length != expected {
            self.telemetry.record_command_error();
            tracing::warn!(
                code = frame.code,
                length = frame.length,
                expected,
                "command length mismatch"
            );
            self.send_bridge_event(
                events::LENGTH_ERR_EID,
                events::ERROR,
                &format!(
                    "Invalid msg length: CC = {}, Len = {}, Expected = {}",
                    frame.code, frame.length, expected
                ),
            );
            return;
        }

        match frame.code {
            control::NOOP_CC => {
                self.telemetry.record_command();
                self.send_bridge_event(
                    events::COMMAND_NOOP_INF_EID,
                    events::INFORMATION,
                    &format!("No-op command, version {}", BRIDGE_VERSION),
                );
            }
            control::RESET_COUNTERS_CC => {
                // The reset itself is counted, not the counters it clears.
                self.telemetry.reset_counters();
                self.telemetry.record_reset();
                tracing::debug!("command counters reset");
                self.send_bridge_event(
                    events::COMMAND_RESET_INF_EID,
                    events::INFORMATION,
                    "Reset counters command received",
                );
            }
            _ => unreachable!("expected_length filtered unknown codes"),
        }
    }

    fn send_bridge_event(&mut self, event_id: u16, severity: u16, text: &str) {
        self.services
            .events
            .send_event_with_origin(event_id, severity, self.config.origin_id, text);
    }

    async fn shutdown(&mut self, channel: &mut PairChannel) {
        tracing::info!(
            run_status = self.run_status,
            graceful = self.graceful_exit,
            "bridge terminating"
        );
        self.services.telemetry_sink.emit(&self.telemetry);
        if self.graceful_exit {
            // The child asked to exit on its own; give it the grace of one
            // receive window before resorting to a kill.
            self.supervisor.await_exit(self.config.recv_timeout).await;
        } else {
            self.supervisor.force_kill().await;
        }
        channel.close();
        self.services.executive.exit_app(self.run_status);
    }
}
