//! Command handlers: CLI args in, core calls, formatted output out.

pub mod config_cmd;
pub mod entity;
pub mod push;
pub mod server;
pub mod util;
