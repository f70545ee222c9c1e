//! `edgebox_utils` is a library containing general utilities for the edgebox project.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod defaults;
pub mod env;
pub mod path;
pub mod runlock;

pub use defaults::*;
pub use env::*;
pub use error::*;
pub use path::*;
pub use runlock::*;
