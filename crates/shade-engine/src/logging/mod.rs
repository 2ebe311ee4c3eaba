//! Logger setup.
//!
//! The engine logs through the `log` facade only. Binaries call
//! [`init_logging`] once at startup to install `env_logger`.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
