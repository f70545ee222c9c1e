//! The local replica of the twin.
//!
//! Locally owned things publish every change before applying it; a failed publish leaves the
//! thing untouched. Changes received from the twin are applied directly. Either way a
//! [`ChangeRecord`] is broadcast on the registry's [`ChangeBus`].

mod changes;
mod feature;
mod ids;
mod pointer;
mod registry;
mod thing;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use changes::*;
pub use feature::*;
pub use ids::*;
pub use registry::*;
pub use thing::*;
