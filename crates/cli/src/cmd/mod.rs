//! CLI command implementations

pub mod config;
pub mod release;
pub mod serve;
pub mod status;
