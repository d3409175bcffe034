//! Logger bootstrap shared by the simulation runner binaries.
//!
//! Every crate in the workspace logs through `tracing`; this crate only installs the global subscriber.
mod logger;
pub use logger::*;
