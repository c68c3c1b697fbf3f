//! mini_openclaw: a tool-using conversational agent backend.
//!
//! The library exposes every module so the binary and the integration
//! tests under `tests/` share one implementation.

pub mod agent;
pub mod cli;
pub mod config;
pub mod files;
pub mod gateway;
pub mod knowledge;
pub mod logs;
pub mod models;
pub mod prompt;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;
