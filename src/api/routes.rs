//! Router, handlers and server entry point.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::types::{
    ErrorDetail, LogsParams, LogsResponse, MissionStatusResponse, ResultStatus, RootResponse,
    StartMissionResponse, StopMissionResponse,
};
use crate::config::{Config, ConfigError};
use crate::mission::{MissionError, MissionSupervisor};

/// Default number of lines served by `/logs`.
const DEFAULT_LOG_LINES: i64 = 100;

/// Upper bound on `lines` for `/logs`.
const MAX_LOG_LINES: i64 = 10_000;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub supervisor: Arc<MissionSupervisor>,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let supervisor = Arc::new(MissionSupervisor::new(config.mission.clone()));
        Arc::new(Self { config, supervisor })
    }
}

/// CORS for the single configured origin, with credentials. `*` mirrors the
/// request origin since a literal wildcard cannot be combined with credentials.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = origin.trim();
    let allow_origin = if origin == "*" {
        AllowOrigin::mirror_request()
    } else {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| ConfigError::InvalidValue("cors_origin".to_string(), e.to_string()))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn router(state: Arc<AppState>) -> Result<Router, ConfigError> {
    let cors = cors_layer(&state.config.cors_origin)?;

    Ok(Router::new()
        .route("/", get(root))
        .route("/start_mission", post(start_mission))
        .route("/stop_mission", post(stop_mission))
        .route("/mission_status", get(mission_status))
        .route("/logs", get(get_logs))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Run the HTTP server until a shutdown signal arrives, then stop any
/// running mission before returning.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(config);
    let supervisor = Arc::clone(&state.supervisor);
    let addr = state.config.bind_addr();
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("WildWings service starting up on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("WildWings service shutting down");
    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn root() -> Json<RootResponse> {
    info!("Root endpoint accessed");
    Json(RootResponse {
        message: "WildWings Service",
        status: "running",
    })
}

async fn start_mission(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StartMissionResponse>, (StatusCode, Json<ErrorDetail>)> {
    info!("Start mission endpoint accessed");

    match state.supervisor.start().await {
        Ok(()) => Ok(Json(StartMissionResponse {
            status: ResultStatus::Success,
            message: "WildWings mission started".to_string(),
        })),
        Err(MissionError::AlreadyRunning) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorDetail {
                detail: MissionError::AlreadyRunning.to_string(),
            }),
        )),
        Err(e) => {
            error!("Failed to start mission: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorDetail {
                    detail: format!("Failed to start mission: {}", e),
                }),
            ))
        }
    }
}

async fn stop_mission(State(state): State<Arc<AppState>>) -> Json<StopMissionResponse> {
    info!("Stop mission endpoint accessed");
    Json(state.supervisor.stop().await.into())
}

async fn mission_status(State(state): State<Arc<AppState>>) -> Json<MissionStatusResponse> {
    Json(state.supervisor.status().await.into())
}

async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> Json<LogsResponse> {
    let lines = params
        .lines
        .unwrap_or(DEFAULT_LOG_LINES)
        .clamp(0, MAX_LOG_LINES) as usize;
    info!("Logs endpoint accessed - requesting {} lines", lines);

    let buffer = state.supervisor.logs();
    let runtime_logs = buffer.tail(lines).await;
    let total_runtime_logs = buffer.len().await;

    let path = &state.config.logfile_path;
    let (logs, total_lines) = match read_log_tail(path, lines).await {
        Ok(Some((logs, total_lines))) => {
            info!(
                "Returning {} file log lines and {} runtime log lines",
                logs.len(),
                runtime_logs.len()
            );
            (logs, total_lines)
        }
        Ok(None) => {
            warn!("Log file not found at: {}", path.display());
            (vec!["Log file not found".to_string()], 0)
        }
        Err(e) => {
            error!("Failed to read logs: {}", e);
            (vec![format!("Error reading logs: {}", e)], 0)
        }
    };

    Json(LogsResponse {
        logs,
        total_lines,
        runtime_logs,
        total_runtime_logs,
    })
}

/// Last `lines` lines of the log file, trimmed with blanks dropped, and the
/// file's total line count. `None` if the file does not exist.
async fn read_log_tail(path: &Path, lines: usize) -> std::io::Result<Option<(Vec<String>, usize)>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let skip = all.len().saturating_sub(lines);
    let tail = all[skip..]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Some((tail, all.len())))
}
