//! The mission supervisor.
//!
//! Owns the single mission worker. `start` spawns the worker on the tokio
//! runtime and returns at once; the worker launches the script, streams its
//! output into the [`LogBuffer`] and resets all state when it exits, whether
//! the script finished, failed to launch, or was stopped.
//!
//! `start`, `stop` and `shutdown` are serialized by a lifecycle lock, so the
//! "is a worker alive" check and the spawn that follows are atomic. `status`
//! never takes that lock and is always answered immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::process::{self, MissionProcess, Signal};
use super::{lock, LogBuffer, MissionError, MissionState};
use crate::config::MissionConfig;

/// How many buffered lines a status report includes.
pub const RECENT_LOG_COUNT: usize = 10;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Snapshot returned by [`MissionSupervisor::status`].
#[derive(Debug, Clone)]
pub struct MissionStatus {
    pub state: MissionState,
    pub worker_alive: bool,
    pub stop_requested: bool,
    pub is_running: bool,
    pub total_logs: usize,
    pub recent_logs: Vec<String>,
    pub last_exit_code: Option<i32>,
}

/// Result of a stop request. Failures are reported here rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub success: bool,
    pub message: String,
    pub was_running: bool,
}

impl StopOutcome {
    fn not_running() -> Self {
        Self {
            success: true,
            message: "No mission currently running".to_string(),
            was_running: false,
        }
    }

    fn stopped() -> Self {
        Self {
            success: true,
            message: "Mission stopped successfully".to_string(),
            was_running: true,
        }
    }

    fn failed(err: &MissionError) -> Self {
        Self {
            success: false,
            message: format!("Error stopping mission: {}", err),
            was_running: true,
        }
    }
}

/// Flags shared between the supervisor and the worker.
#[derive(Default)]
struct MissionShared {
    stop_requested: AtomicBool,
    is_running: AtomicBool,
    /// Set while the script is alive and not yet reaped
    active_pid: Mutex<Option<u32>>,
    last_exit_code: Mutex<Option<i32>>,
}

impl MissionShared {
    fn active_pid(&self) -> Option<u32> {
        *lock(&self.active_pid)
    }

    fn set_active_pid(&self, pid: Option<u32>) {
        *lock(&self.active_pid) = pid;
    }
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

pub struct MissionSupervisor {
    config: MissionConfig,
    logs: Arc<LogBuffer>,
    shared: Arc<MissionShared>,
    worker: Mutex<Option<Worker>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl MissionSupervisor {
    pub fn new(config: MissionConfig) -> Self {
        Self::with_log_buffer(config, Arc::new(LogBuffer::new()))
    }

    pub fn with_log_buffer(config: MissionConfig, logs: Arc<LogBuffer>) -> Self {
        Self {
            config,
            logs,
            shared: Arc::new(MissionShared::default()),
            worker: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// The buffer mission output is captured into.
    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    /// Pid of the running script, if one is alive.
    pub fn active_pid(&self) -> Option<u32> {
        self.shared.active_pid()
    }

    pub fn worker_alive(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    fn current_cancel(&self) -> Option<CancellationToken> {
        lock(&self.worker).as_ref().map(|w| w.cancel.clone())
    }

    /// Launch a new mission in the background.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if a worker is alive, `SpawnFailure` if there is no
    /// runtime to run the worker on.
    pub async fn start(&self) -> Result<(), MissionError> {
        let _guard = self.lifecycle.lock().await;

        if self.worker_alive() {
            error!("Mission already running");
            return Err(MissionError::AlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MissionError::SpawnFailure(e.to_string()))?;

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let run = MissionRun {
            config: self.config.clone(),
            logs: Arc::clone(&self.logs),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };
        let handle = runtime.spawn(run.execute());
        *lock(&self.worker) = Some(Worker { handle, cancel });

        info!("WildWings mission started");
        Ok(())
    }

    /// Stop the current mission, if any. Never fails; errors are reported in
    /// the returned outcome.
    pub async fn stop(&self) -> StopOutcome {
        let _guard = self.lifecycle.lock().await;

        if !self.worker_alive() {
            info!("No mission currently running");
            return StopOutcome::not_running();
        }

        match self.halt(self.config.stop_join).await {
            Ok(()) => {
                self.shared.is_running.store(false, Ordering::SeqCst);
                info!("Mission stopped successfully");
                StopOutcome::stopped()
            }
            Err(e) => {
                error!("Failed to stop mission: {}", e);
                self.shared.is_running.store(false, Ordering::SeqCst);
                self.shared.stop_requested.store(true, Ordering::SeqCst);
                StopOutcome::failed(&e)
            }
        }
    }

    /// Stop any running mission before the service exits. Bounded by the
    /// grace period plus the shutdown join timeout.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        if !self.worker_alive() {
            return;
        }

        info!("Stopping running mission during shutdown");
        if let Err(e) = self.halt(self.config.shutdown_join).await {
            warn!("Failed to stop mission during shutdown: {}", e);
        }
        self.shared.is_running.store(false, Ordering::SeqCst);
    }

    /// Current state, computed from the live flags.
    pub async fn status(&self) -> MissionStatus {
        let worker_alive = self.worker_alive();
        let stop_requested = self.shared.stop_requested.load(Ordering::SeqCst);
        let last_exit_code = *lock(&self.shared.last_exit_code);
        MissionStatus {
            state: MissionState::derive(worker_alive, stop_requested),
            worker_alive,
            stop_requested,
            is_running: self.shared.is_running.load(Ordering::SeqCst),
            total_logs: self.logs.len().await,
            recent_logs: self.logs.tail(RECENT_LOG_COUNT).await,
            last_exit_code,
        }
    }

    /// Request cancellation, terminate the process group (escalating to a
    /// kill after the grace period) and wait for the worker.
    async fn halt(&self, join_timeout: Duration) -> Result<(), MissionError> {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        if let Some(cancel) = self.current_cancel() {
            cancel.cancel();
        }
        info!("Stop mission flag set");

        if let Some(pid) = self.shared.active_pid() {
            info!(pid, "Terminating mission process");
            process::signal_group(pid, Signal::Terminate).map_err(MissionError::StopFailure)?;

            let shared = Arc::clone(&self.shared);
            if wait_until(self.config.stop_grace, || shared.active_pid() != Some(pid)).await {
                info!(pid, "Process terminated gracefully");
            } else {
                warn!(pid, "Process didn't terminate gracefully, forcing kill");
                process::signal_group(pid, Signal::Kill).map_err(MissionError::StopFailure)?;
            }
        }

        if !wait_until(join_timeout, || !self.worker_alive()).await {
            warn!(
                timeout_ms = join_timeout.as_millis() as u64,
                "Mission worker didn't finish within timeout"
            );
        }
        Ok(())
    }
}

/// Poll `done` until it holds or `timeout` elapses. Returns whether it held.
async fn wait_until<F>(timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Everything the worker needs, moved onto its task.
struct MissionRun {
    config: MissionConfig,
    logs: Arc<LogBuffer>,
    shared: Arc<MissionShared>,
    cancel: CancellationToken,
}

impl MissionRun {
    async fn execute(self) {
        if let Err(e) = self.run().await {
            error!("Mission failed: {}", e);
        }

        self.shared.is_running.store(false, Ordering::SeqCst);
        self.shared.set_active_pid(None);
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        info!("Mission worker finished");
    }

    async fn run(&self) -> Result<(), MissionError> {
        if self.cancel.is_cancelled() || self.shared.stop_requested.load(Ordering::SeqCst) {
            info!("Mission stopped before execution");
            return Ok(());
        }

        info!("Starting WildWings mission");
        tokio::fs::create_dir_all(&self.config.mission_dir).await?;

        let script = &self.config.script_path;
        if !tokio::fs::try_exists(script).await.unwrap_or(false) {
            return Err(MissionError::ScriptNotFound(script.clone()));
        }
        process::make_executable(script).await?;

        let mut mission = process::spawn(script, &self.config.app_dir)
            .map_err(|e| MissionError::SpawnFailure(e.to_string()))?;
        self.shared.is_running.store(true, Ordering::SeqCst);
        self.shared.set_active_pid(Some(mission.pid));
        info!(pid = mission.pid, "Mission subprocess started successfully");

        let streamed = self.stream_output(&mut mission).await;
        if streamed.is_err() {
            // Reading failed while the script may still be alive.
            if let Err(e) = process::signal_group(mission.pid, Signal::Terminate) {
                warn!(pid = mission.pid, "Failed to terminate mission after read error: {}", e);
            }
        }

        let waited = mission.child.wait().await;
        self.shared.set_active_pid(None);
        match waited {
            Ok(status) => {
                let code = process::exit_code(status);
                *lock(&self.shared.last_exit_code) = code;
                info!("Mission completed with return code: {:?}", code);
            }
            Err(e) => warn!("Failed to wait for mission process: {}", e),
        }

        streamed
    }

    async fn stream_output(&self, mission: &mut MissionProcess) -> Result<(), MissionError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Stop signal received, terminating mission");
                    process::signal_group(mission.pid, Signal::Terminate)
                        .map_err(MissionError::StopFailure)?;
                    return Ok(());
                }
                next = mission.output.recv() => match next {
                    Some(Ok(line)) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            self.logs.append(line).await;
                            info!("Mission output: {}", line);
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
            }
        }
    }
}
