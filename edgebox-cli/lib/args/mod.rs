//! Command line arguments of the edgebox binaries.

mod edgeboxd;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use edgeboxd::*;
