//! `edgebox-server` exposes the daemon's local API over a Unix domain socket.
//!
//! # Endpoints
//!
//! - `GET  /api/v1/health`
//! - `GET  /api/v1/containers`
//! - `GET  /api/v1/containers/{id}`
//! - `GET  /api/v1/containers/{id}/metrics`
//! - `POST /api/v1/containers/{id}/start`
//! - `POST /api/v1/containers/{id}/stop[?timeout=<secs>]`

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod payload;
pub mod route;
pub mod server;
pub mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use config::*;
pub use error::*;
pub use handler::*;
pub use middleware::*;
pub use payload::*;
pub use route::*;
pub use server::*;
pub use state::*;
