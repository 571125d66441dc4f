//! Next-best-view planning loop for an autonomous sensing robot.
//!
//! Each round the planner scores every candidate viewpoint by the cost of
//! moving there and the information it is expected to yield, moves to the best
//! one, and records the decision. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (view space, utility, selection,
//!   control flags, planning table). No I/O.
//! - **[`io`]**: Side-effecting operations (config, service processes, command
//!   channel, data files). Isolated behind traits so tests can script it.
//!
//! Orchestration modules ([`retry`], [`planning`]) coordinate core logic with
//! I/O to implement `planner run`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planning;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
