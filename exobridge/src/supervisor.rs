//! Child process lifecycle: spawn at startup, forced termination at the end.
//!
//! Spawn failure on the parent side is non-fatal: the bridge keeps running
//! degraded with no child attached. A failure inside the child after the
//! fork (the exec itself) is fatal to the child alone — it cannot report
//! back through shared state, because it no longer shares writable memory
//! with the parent. That asymmetry is deliberate and not engineered around:
//! `spawn` returns a result only to the parent.

use std::sync::Arc;

use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn child process: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SpawnError {
    /// OS error code for the telemetry record, `-1` when the OS gave none.
    pub fn os_code(&self) -> i32 {
        match self {
            Self::Spawn(e) => e.raw_os_error().unwrap_or(-1),
        }
    }
}

/// Extension point for how the child gets launched.
pub trait ChildSpawner: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> Result<Child, SpawnError>;
}

/// Default spawner: exec the configured program directly.
pub struct ExecSpawner;

impl ChildSpawner for ExecSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> Result<Child, SpawnError> {
        let child = Command::new(program).args(args).kill_on_drop(true).spawn()?;
        Ok(child)
    }
}

/// Owns the child process handle for the lifetime of the bridge.
pub struct ChildSupervisor {
    spawner: Arc<dyn ChildSpawner>,
    child: Option<Child>,
}

impl ChildSupervisor {
    pub fn new(spawner: Arc<dyn ChildSpawner>) -> Self {
        Self {
            spawner,
            child: None,
        }
    }

    /// Launch the child. On success the handle is held until forced
    /// termination or reap; on failure the bridge runs with no child.
    pub fn spawn(&mut self, program: &str, args: &[String]) -> Result<(), SpawnError> {
        let child = self.spawner.spawn(program, args)?;
        tracing::info!(program, pid = child.id(), "child spawned");
        self.child = Some(child);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Wait up to `grace` for a child that is exiting on its own; kill it if
    /// the grace period runs out.
    pub async fn await_exit(&mut self, grace: std::time::Duration) {
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => {
                    tracing::info!(status = ?status.ok(), "child exited");
                }
                Err(_) => {
                    tracing::warn!("child still alive after grace period");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
    }

    /// Kill the child if still attached and reap it.
    pub async fn force_kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.start_kill() {
                Ok(()) => {
                    tracing::info!(pid = child.id(), "child force-killed");
                    let _ = child.wait().await;
                }
                Err(e) => {
                    // Already exited on its own; just reap.
                    tracing::debug!(error = %e, "child kill skipped");
                    let _ = child.wait().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_failure_reports_os_code() {
        let mut supervisor = ChildSupervisor::new(Arc::new(ExecSpawner));
        let err = supervisor
            .spawn("/nonexistent/exobridge-test-child", &[])
            .unwrap_err();
        assert_ne!(err.os_code(), 0);
        assert!(!supervisor.is_attached());
    }

    #[tokio::test]
    async fn spawn_then_force_kill() {
        let mut supervisor = ChildSupervisor::new(Arc::new(ExecSpawner));
        supervisor
            .spawn("/bin/sleep", &["30".to_string()])
            .unwrap();
        assert!(supervisor.is_attached());
        assert!(supervisor.pid().is_some());

        supervisor.force_kill().await;
        assert!(!supervisor.is_attached());
    }

    #[tokio::test]
    async fn await_exit_reaps_a_child_that_exits_itself() {
        let mut supervisor = ChildSupervisor::new(Arc::new(ExecSpawner));
        supervisor.spawn("/bin/true", &[]).unwrap();
        supervisor
            .await_exit(std::time::Duration::from_secs(5))
            .await;
        assert!(!supervisor.is_attached());
    }

    #[tokio::test]
    async fn await_exit_kills_after_the_grace_period() {
        let mut supervisor = ChildSupervisor::new(Arc::new(ExecSpawner));
        supervisor
            .spawn("/bin/sleep", &["30".to_string()])
            .unwrap();
        supervisor
            .await_exit(std::time::Duration::from_millis(50))
            .await;
        assert!(!supervisor.is_attached());
    }

    #[tokio::test]
    async fn force_kill_without_child_is_a_no_op() {
        let mut supervisor = ChildSupervisor::new(Arc::new(ExecSpawner));
        supervisor.force_kill().await;
        assert!(!supervisor.is_attached());
    }
}
