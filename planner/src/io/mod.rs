//! Side-effecting helpers: configuration, service clients, operator commands
//! and planning data files.

pub mod capabilities;
pub mod commands;
pub mod config;
pub mod data_file;
pub mod process;
pub mod service_process;
