//! # WildWings
//!
//! HTTP control service for the WildWings wildlife monitoring mission.
//!
//! This library provides:
//! - A supervisor that runs the external launch script, at most one at a time
//! - An in-memory ring buffer of the script's output
//! - An HTTP API to start, stop and monitor the mission
//!
//! ## Architecture
//!
//! 1. `POST /start_mission` asks the supervisor to spawn a worker task
//! 2. The worker runs `bash launch.sh` and streams its output into the buffer
//! 3. `POST /stop_mission` cancels the worker and terminates the script
//! 4. `GET /mission_status` and `GET /logs` read the current state at any time
//!
//! ## Example
//!
//! ```rust,ignore
//! use wildwings::{api, config::Config};
//!
//! let config = Config::load()?;
//! api::serve(config).await?;
//! ```

pub mod api;
pub mod config;
pub mod logging;
pub mod mission;

pub use config::Config;
