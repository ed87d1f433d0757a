//! Cross-module scenarios for switchboard-core
//!
//! - Hub fan-out, unicast routing and state replay
//! - Function calls over a controllable, including timeouts
//! - State commands, ranges and persistence
//! - A driver-hosted controllable serving several controls
//! - Configuration files and directories

mod config_tests;
mod driver_tests;
mod state_tests;
