//! Shared pieces of the Kestrel binaries.

pub mod common;
pub mod sim;
