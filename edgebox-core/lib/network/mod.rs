//! Container networking.
//!
//! The network manager places every container into a sandbox (its network namespace and the
//! hosts/resolv.conf/hostname files that go with it) and attaches the sandbox to one network
//! through an endpoint. Two networks exist: `host`, which shares the host namespace, and
//! `bridge`, which hands out private addresses on the managed Linux bridge.
//!
//! ```text
//! none ── manage ──▶ sandboxed ── connect ──▶ connected
//!   ▲                   │                       │
//!   └───────── release_network_resources ───────┘
//! ```

mod config;
mod error;
mod host;
mod manager;
mod options;
mod resolver;

pub mod controller;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use config::*;
pub use error::*;
pub use host::*;
pub use manager::*;
pub use options::*;
pub use resolver::*;
