//! Deterministic, pure logic of the planning loop.
//!
//! Core modules are free of I/O. They operate on in-memory data and return
//! deterministic results, so every decision the loop makes can be tested
//! without services.

pub mod control;
pub mod recorder;
pub mod selector;
pub mod termination;
pub mod types;
pub mod utility;
pub mod view_space;
