//! Process exit codes.
//!
//! Scripts polling a collector can tell "backend down" apart from a bad
//! invocation or a local problem.

/// Command completed.
pub const SUCCESS: u8 = 0;

/// Anything not covered below (bad config, unexpected response, I/O).
pub const GENERAL_ERROR: u8 = 1;

/// Invalid command line. clap exits with this code on its own.
#[allow(dead_code)]
pub const USAGE: u8 = 2;

/// The stats backend could not be reached or did not answer in time.
pub const BACKEND_UNREACHABLE: u8 = 3;
