//! `edgebox` is a container-management daemon for constrained edge devices.
//!
//! # Overview
//!
//! The core crate holds the daemon's engine:
//! - A typed service registry that drives ordered initialization and teardown
//! - The container model and the container manager seam
//! - The container network manager (sandboxes, endpoints, default bridge network)
//! - Resolution of symbolic `extraHosts` references
//! - A broadcast bus of container lifecycle events
//!
//! # Modules
//!
//! - [`config`] - Daemon configuration and defaults
//! - [`container`] - Container model, persistence and lifecycle management
//! - [`events`] - Container lifecycle event bus
//! - [`network`] - Network configuration, controller, manager and extra-host resolver
//! - [`registry`] - Service records, factories and initialized service sets

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod container;
pub mod events;
pub mod network;
pub mod registry;

pub use error::*;
