//! Interfaces to the host executive's services.
//!
//! The bridge only forwards calls; the executive's process scheduler, event
//! transport, and time source live behind these traits. All of them are fast,
//! non-blocking host calls, so the traits are synchronous and every method is
//! invoked from the single thread that owns the run loop.

use crate::bridge::protocol::{EventFilter, SysTime};
use crate::telemetry::TelemetryState;

/// Run-status value meaning "keep running", carried through the run loop and
/// handed back to the executive's exit routine at shutdown.
pub const RUN_STATUS_RUN: u32 = 1;

/// Executive services: registration, cooperative run-status polling,
/// performance markers, and app teardown.
pub trait ExecutiveServices: Send {
    fn register_app(&mut self) -> i32;

    /// Cooperative run-status check. Returns whether the app should keep
    /// running; may rewrite `run_status` with the executive's view.
    fn run_loop(&mut self, run_status: &mut u32) -> bool;

    fn perf_log_add(&mut self, marker: u32, entry_exit: u32);

    /// Hand control back to the executive with the final status code.
    fn exit_app(&mut self, run_status: u32);
}

/// Event-logging services.
pub trait EventServices: Send {
    fn send_event(&mut self, event_id: u16, event_type: u16, text: &str) -> i32;

    fn send_event_with_origin(
        &mut self,
        event_id: u16,
        event_type: u16,
        originator: u32,
        text: &str,
    ) -> i32;

    fn send_timed_event(
        &mut self,
        time: SysTime,
        event_id: u16,
        event_type: u16,
        text: &str,
    ) -> i32;

    /// Register binary event filters. `declared_count` is the caller's
    /// claimed count, which may differ from `filters.len()`; both pass
    /// through as given.
    fn register_filters(
        &mut self,
        filters: &[EventFilter],
        declared_count: u16,
        scheme: u16,
    ) -> i32;

    fn reset_filter(&mut self, event_id: u16) -> i32;

    fn reset_all_filters(&mut self) -> i32;
}

/// Time services.
pub trait TimeServices: Send {
    fn current(&mut self) -> SysTime;
    fn tai(&mut self) -> SysTime;
    fn utc(&mut self) -> SysTime;
    fn met(&mut self) -> SysTime;
    fn stcf(&mut self) -> SysTime;
    fn met_to_spacecraft(&mut self, met: SysTime) -> SysTime;
    fn met_seconds(&mut self) -> u32;
    fn met_subseconds(&mut self) -> u32;
    fn leap_seconds(&mut self) -> i16;
    fn clock_state(&mut self) -> i16;
    fn clock_info(&mut self) -> u16;
}

/// On-demand status report collaborator. Receives the whole telemetry record
/// whenever a report is due (status request, shutdown).
pub trait TelemetrySink: Send {
    fn emit(&mut self, telemetry: &TelemetryState);
}

/// The external collaborators bundled for the run loop and dispatch table.
pub struct HostServices {
    pub executive: Box<dyn ExecutiveServices>,
    pub events: Box<dyn EventServices>,
    pub time: Box<dyn TimeServices>,
    pub telemetry_sink: Box<dyn TelemetrySink>,
}
