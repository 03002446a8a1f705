//! Stable exit codes for the localci binary.

/// The command succeeded.
pub const OK: i32 = 0;
/// A workflow ran and failed, or a command could not complete.
pub const FAILURE: i32 = 1;
/// Invalid command-line usage (reported by clap).
pub const USAGE: i32 = 2;
/// The workflow does not run for the requested event.
pub const SKIPPED: i32 = 3;
/// The workflow file is missing or invalid.
pub const DEFINITION: i32 = 4;
