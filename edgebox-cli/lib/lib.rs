//! `edgebox-cli` wires the edgebox crates into the `edgeboxd` daemon.
//!
//! # Overview
//!
//! The daemon reads its configuration, takes the run-lock, initializes every registered service
//! in boot order, restores persisted containers, connects the twin and serves the local RPC
//! socket until it receives a termination signal.
//!
//! # Modules
//!
//! - [`args`] - Command line arguments
//! - [`daemon`] - Boot, signal wait and shutdown
//! - [`logging`] - Tracing subscriber setup
//! - [`services`] - The default service registrations
//! - [`twin`] - The twin connector mirroring containers to the root thing

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod args;
pub mod daemon;
pub mod logging;
pub mod services;
pub mod styles;
pub mod term;
pub mod twin;

pub use args::*;
pub use daemon::*;
pub use error::*;
pub use logging::*;
pub use services::*;
pub use twin::*;
