//! Mission supervision.
//!
//! A mission is one run of the external launch script. At most one runs at a
//! time; its combined output is captured into a [`LogBuffer`].

mod log_buffer;
pub mod process;
mod supervisor;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;

pub use log_buffer::{LogBuffer, LOG_BUFFER_CAPACITY};
pub use supervisor::{MissionSupervisor, MissionStatus, StopOutcome, RECENT_LOG_COUNT};

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("Mission already running")]
    AlreadyRunning,

    #[error("Launch script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Failed to spawn mission: {0}")]
    SpawnFailure(String),

    #[error("Failed to signal mission process: {0}")]
    StopFailure(std::io::Error),

    #[error("Mission I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Externally visible mission state, derived on every status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    /// No worker alive
    Idle,
    /// Worker alive, no stop requested
    Running,
    /// Worker alive, stop requested
    Stopping,
}

impl MissionState {
    pub fn derive(worker_alive: bool, stop_requested: bool) -> Self {
        match (worker_alive, stop_requested) {
            (false, _) => MissionState::Idle,
            (true, false) => MissionState::Running,
            (true, true) => MissionState::Stopping,
        }
    }
}

/// Locks ignore poisoning: the guarded values are plain flags and handles.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_follows_worker_and_stop_flag() {
        assert_eq!(MissionState::derive(false, false), MissionState::Idle);
        assert_eq!(MissionState::derive(false, true), MissionState::Idle);
        assert_eq!(MissionState::derive(true, false), MissionState::Running);
        assert_eq!(MissionState::derive(true, true), MissionState::Stopping);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MissionState::Stopping).unwrap(),
            "\"stopping\""
        );
    }
}
