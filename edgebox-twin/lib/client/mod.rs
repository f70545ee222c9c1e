//! The MQTT side of the twin.
//!
//! [`TwinClient`] performs the gateway handshake on every connect, mirrors twin change events
//! into a [`ThingRegistry`](crate::model::ThingRegistry) and answers commands with the
//! operations handlers of the addressed thing or feature.

mod client;
mod config;
mod connection;
mod routes;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use client::*;
pub use config::*;
pub use connection::*;
pub use routes::*;
