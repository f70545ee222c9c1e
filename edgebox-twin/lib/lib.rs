//! `edgebox-twin` keeps a local replica of a remote digital twin.
//!
//! # Overview
//!
//! A *thing* has attributes and a map of *features*; a feature has a definition and
//! properties. The device owns a root thing named `<gatewayDeviceId>:<deviceName>`. Local
//! changes are published to the twin before they are applied; changes made on the twin side
//! arrive as events and are applied directly. Operations invoked on the twin reach the device
//! as commands and are answered by the registered operations handler.
//!
//! # Modules
//!
//! - [`protocol`] - Envelope, headers, topic and path grammar, wire errors
//! - [`model`] - Things, features, the thing registry and the change bus
//! - [`client`] - MQTT connection, bootstrap handshake, event and command dispatch

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod client;
pub mod model;
pub mod protocol;

pub use error::*;
