//! Control-plane surface: ground commands and status requests.
//!
//! The external collaborator delivers discrete messages on an in-process
//! queue; the run loop polls it non-blockingly once per iteration, before the
//! RPC poll, so command-versus-reply ordering is deterministic. Each command
//! code has a fixed expected message length; a mismatch is a reportable
//! error, not a crash.

use tokio::sync::mpsc;

/// No-op acknowledgment command.
pub const NOOP_CC: u16 = 0;
/// Zero the ground-command counters.
pub const RESET_COUNTERS_CC: u16 = 1;

/// Fixed total length expected for each no-argument command message.
pub const NO_ARGS_CMD_LENGTH: u16 = 8;

/// Expected message length for a command code, or `None` for an
/// unrecognized code.
pub fn expected_length(code: u16) -> Option<u16> {
    match code {
        NOOP_CC | RESET_COUNTERS_CC => Some(NO_ARGS_CMD_LENGTH),
        _ => None,
    }
}

/// One ground command as delivered: code plus the sender's claimed total
/// message length (verified against [`expected_length`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub code: u16,
    pub length: u16,
}

impl CommandFrame {
    pub fn noop() -> Self {
        Self {
            code: NOOP_CC,
            length: NO_ARGS_CMD_LENGTH,
        }
    }

    pub fn reset_counters() -> Self {
        Self {
            code: RESET_COUNTERS_CC,
            length: NO_ARGS_CMD_LENGTH,
        }
    }
}

/// A message on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Command(CommandFrame),
    /// Emit the telemetry report through the configured sink.
    RequestStatus,
}

/// Sending half of the control plane, held by the external collaborator.
#[derive(Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlSender {
    pub fn noop(&self) {
        let _ = self.tx.send(ControlMessage::Command(CommandFrame::noop()));
    }

    pub fn reset_counters(&self) {
        let _ = self
            .tx
            .send(ControlMessage::Command(CommandFrame::reset_counters()));
    }

    pub fn request_status(&self) {
        let _ = self.tx.send(ControlMessage::RequestStatus);
    }

    /// Deliver an arbitrary command frame (length and code unchecked here;
    /// the run loop verifies them).
    pub fn send_command(&self, frame: CommandFrame) {
        let _ = self.tx.send(ControlMessage::Command(frame));
    }
}

/// Build the control plane. The receiver goes to [`crate::Bridge`], the
/// sender to whoever injects commands.
pub fn control_channel() -> (ControlSender, mpsc::UnboundedReceiver<ControlMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, rx)
}
