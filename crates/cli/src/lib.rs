//! Settle CLI - the `settle` binary's commands and HTTP intake

pub mod cmd;
pub mod logging;
pub mod server;
pub mod util;
