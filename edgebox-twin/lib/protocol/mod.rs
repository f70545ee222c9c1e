//! The twin wire protocol.
//!
//! Every operation travels as an [`Envelope`]: a topic naming the thing, channel, criterion
//! and action, a header map, a path into the thing and an optional JSON value.

mod envelope;
mod error;
mod headers;
mod path;
mod topic;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use envelope::*;
pub use error::*;
pub use headers::*;
pub use path::*;
pub use topic::*;
