//! Stable exit codes for planner CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, unreachable service command, I/O failure or other errors.
pub const INVALID: i32 = 1;
/// `planner run` reached a round in which every candidate view was excluded.
pub const NO_VIABLE_VIEW: i32 = 2;
