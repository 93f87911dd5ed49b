//! podsync server - control-plane HTTP API.
//!
//! Exposes the job state machine over HTTP (status, start, pause, resume,
//! stop), plus health, the sync audit log, and auto-sync scheduling
//! settings. The sync engine itself lives in `podsync-core`.

pub mod auth;
pub mod autosync;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;
