//! Mutable bridge telemetry: counters, last error codes, child run state.
//!
//! Pure data plus accessors; every component writes into it through the
//! single owning thread, and the whole record is serialized out whenever the
//! external reporting collaborator asks for a status report.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Last observed state of the supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildRunState {
    #[default]
    Unknown,
    Running,
    /// Child attached but silent past the staleness threshold.
    TimedOut,
    Exited,
}

/// The bridge's housekeeping record. Fixed layout; initialized once at
/// startup and alive for the process lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryState {
    command_count: u8,
    command_error_count: u8,
    transport_error: i32,
    spawn_error: i32,
    child_run_state: ChildRunState,
    calls_received: u32,
    resets_performed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_activity: Option<DateTime<Utc>>,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_count(&self) -> u8 {
        self.command_count
    }

    pub fn command_error_count(&self) -> u8 {
        self.command_error_count
    }

    pub fn transport_error(&self) -> i32 {
        self.transport_error
    }

    pub fn spawn_error(&self) -> i32 {
        self.spawn_error
    }

    pub fn child_run_state(&self) -> ChildRunState {
        self.child_run_state
    }

    pub fn calls_received(&self) -> u32 {
        self.calls_received
    }

    pub fn resets_performed(&self) -> u32 {
        self.resets_performed
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn record_command(&mut self) {
        self.command_count = self.command_count.wrapping_add(1);
    }

    pub fn record_command_error(&mut self) {
        self.command_error_count = self.command_error_count.wrapping_add(1);
    }

    pub fn record_transport_error(&mut self, code: i32) {
        self.transport_error = code;
    }

    pub fn record_spawn_error(&mut self, code: i32) {
        self.spawn_error = code;
    }

    pub fn set_child_state(&mut self, state: ChildRunState) {
        self.child_run_state = state;
    }

    /// One proxied call arrived: the child is demonstrably alive.
    pub fn record_call(&mut self) {
        self.calls_received = self.calls_received.wrapping_add(1);
        self.child_run_state = ChildRunState::Running;
        self.last_activity = Some(Utc::now());
    }

    pub fn record_reset(&mut self) {
        self.resets_performed = self.resets_performed.wrapping_add(1);
    }

    /// Zero the ground-command counters. Other fields keep their values.
    pub fn reset_counters(&mut self) {
        self.command_count = 0;
        self.command_error_count = 0;
    }

    /// The serialized report form.
    pub fn report_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
