//! In-memory lifecycle of the local orchestration sequence.
//!
//! Distinct from the engine-reported container state: the phase tracks what
//! this process has done, the container state is what the engine says now.
//! The phase lives only in memory and is lost on process exit.

use chrono::{DateTime, Utc};

/// Lifecycle stage of the supervisor.
///
/// Advances strictly forward through the startup sequence; `Failed` is
/// terminal until an explicit reset restarts the sequence from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// Nothing started yet.
    Idle,
    /// Scanning for a usable service port.
    PortResolving,
    /// Ensuring image, volumes, and container.
    Provisioning,
    /// Waiting for the liveness endpoint to answer.
    HealthChecking,
    /// The service answered; supervision is steady-state.
    Ready,
    /// A startup step failed; terminal until reset.
    Failed,
    /// Shutdown in progress.
    Stopping,
    /// The service was stopped by this process.
    Stopped,
}

impl SupervisorPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: SupervisorPhase) -> bool {
        use SupervisorPhase::*;
        matches!(
            (self, next),
            (Idle, PortResolving)
                | (PortResolving, Provisioning)
                | (Provisioning, HealthChecking)
                | (HealthChecking, Ready)
                | (Idle, Failed)
                | (PortResolving, Failed)
                | (Provisioning, Failed)
                | (HealthChecking, Failed)
                | (Ready, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Whether the sequence can be restarted from this phase via a reset.
    pub fn can_reset(self) -> bool {
        matches!(
            self,
            SupervisorPhase::Failed | SupervisorPhase::Stopped | SupervisorPhase::Idle
        )
    }

    pub fn is_failed(self) -> bool {
        self == SupervisorPhase::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SupervisorPhase::Idle => "idle",
            SupervisorPhase::PortResolving => "resolving port",
            SupervisorPhase::Provisioning => "provisioning",
            SupervisorPhase::HealthChecking => "health checking",
            SupervisorPhase::Ready => "ready",
            SupervisorPhase::Failed => "failed",
            SupervisorPhase::Stopping => "stopping",
            SupervisorPhase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set once provisioning completes; used only to compute uptime.
#[derive(Debug, Clone, Copy)]
pub struct StartRecord {
    /// When the container was started by this process.
    pub started_at: DateTime<Utc>,
}

impl StartRecord {
    pub fn now() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }

    /// Whole seconds elapsed since start, never negative.
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SupervisorPhase::*;

    #[test]
    fn startup_sequence_advances_forward() {
        assert!(Idle.can_advance_to(PortResolving));
        assert!(PortResolving.can_advance_to(Provisioning));
        assert!(Provisioning.can_advance_to(HealthChecking));
        assert!(HealthChecking.can_advance_to(Ready));
    }

    #[test]
    fn no_backwards_transitions() {
        assert!(!Ready.can_advance_to(Provisioning));
        assert!(!HealthChecking.can_advance_to(PortResolving));
        assert!(!Provisioning.can_advance_to(Idle));
    }

    #[test]
    fn failed_is_terminal_without_reset() {
        assert!(!Failed.can_advance_to(PortResolving));
        assert!(!Failed.can_advance_to(Ready));
        assert!(Failed.can_reset());
    }

    #[test]
    fn shutdown_path() {
        assert!(Ready.can_advance_to(Stopping));
        assert!(Stopping.can_advance_to(Stopped));
        assert!(Stopped.can_reset());
        assert!(!Ready.can_reset());
    }

    #[test]
    fn failure_reachable_from_every_startup_step() {
        // Idle included: the engine availability gate can fail before the
        // port scan begins.
        for phase in [Idle, PortResolving, Provisioning, HealthChecking] {
            assert!(phase.can_advance_to(Failed));
        }
        assert!(!Ready.can_advance_to(Failed));
    }

    #[test]
    fn uptime_is_non_negative() {
        let record = StartRecord::now();
        assert!(record.uptime_seconds() < 5);
    }
}
