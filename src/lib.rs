//! boardwatch library: re-exports modules for the binary and integration
//! tests.

pub mod bot;
pub mod channel;
pub mod config;
pub mod log_sink;
pub mod watch;
pub mod weeek;
