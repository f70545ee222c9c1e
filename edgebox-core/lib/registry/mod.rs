//! The service registry.
//!
//! Every daemon component is described by a [`Registration`]: a service type, an id unique
//! within that type and an async factory. The [`Registry`] keeps registrations in insertion
//! order; the orchestrator walks [`BOOT_ORDER`] and, for each type, calls the factories with a
//! [`ServiceContext`] that carries the typed options for the service and every service
//! initialized before it. Results land in a [`ServiceInfoSet`], which later services query by
//! type and which is torn down in reverse order.

mod info;
mod registration;
mod service;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use info::*;
pub use registration::*;
pub use service::*;
