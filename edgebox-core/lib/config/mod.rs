//! Daemon configuration.
//!
//! The daemon reads one JSON file (camelCase keys). Every key is optional; absent keys take the
//! defaults below, and command-line flags override what the file says.

mod daemon;
mod things;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use daemon::*;
pub use things::*;
