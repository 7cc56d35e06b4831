//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::mission::{MissionState, MissionStatus, StopOutcome};

/// Response of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
}

/// Outcome label used by the start/stop responses.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Response of `POST /start_mission`.
#[derive(Debug, Clone, Serialize)]
pub struct StartMissionResponse {
    pub status: ResultStatus,
    pub message: String,
}

/// Response of `POST /stop_mission`.
#[derive(Debug, Clone, Serialize)]
pub struct StopMissionResponse {
    pub status: ResultStatus,
    pub message: String,
    pub was_running: bool,
}

impl From<StopOutcome> for StopMissionResponse {
    fn from(outcome: StopOutcome) -> Self {
        Self {
            status: if outcome.success {
                ResultStatus::Success
            } else {
                ResultStatus::Error
            },
            message: outcome.message,
            was_running: outcome.was_running,
        }
    }
}

/// Response of `GET /mission_status`.
#[derive(Debug, Clone, Serialize)]
pub struct MissionStatusResponse {
    pub status: MissionState,
    pub thread_alive: bool,
    pub stop_requested: bool,
    pub is_running: bool,
    pub total_logs: usize,
    pub recent_logs: Vec<String>,
    /// Exit code of the most recent mission; `null` until one has exited
    pub last_exit_code: Option<i32>,
}

impl From<MissionStatus> for MissionStatusResponse {
    fn from(status: MissionStatus) -> Self {
        Self {
            status: status.state,
            thread_alive: status.worker_alive,
            stop_requested: status.stop_requested,
            is_running: status.is_running,
            total_logs: status.total_logs,
            recent_logs: status.recent_logs,
            last_exit_code: status.last_exit_code,
        }
    }
}

/// Query parameters of `GET /logs`.
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    /// Lines to return from each source (default: 100, clamped to 0..=10000)
    pub lines: Option<i64>,
}

/// Response of `GET /logs`.
#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    /// Tail of the service log file, or a single explanatory message
    pub logs: Vec<String>,
    pub total_lines: usize,
    /// Tail of the in-memory mission output buffer
    pub runtime_logs: Vec<String>,
    pub total_runtime_logs: usize,
}

/// Body of non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}
