//! Containers as seen by the daemon: the persisted model and its lifecycle manager.

mod manager;
mod model;
mod runtime;
mod store;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use manager::*;
pub use model::*;
pub use runtime::*;
pub use store::*;
