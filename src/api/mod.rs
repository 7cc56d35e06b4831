//! HTTP control API.
//!
//! Five routes project the [`MissionSupervisor`](crate::mission::MissionSupervisor)
//! onto JSON:
//! - `GET /` - liveness
//! - `POST /start_mission`
//! - `POST /stop_mission`
//! - `GET /mission_status`
//! - `GET /logs?lines=N`

mod routes;
pub mod types;

pub use routes::{cors_layer, router, serve, AppState};
