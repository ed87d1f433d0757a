//! Message fabric: sinks, hubs, controllables, state synchronization and
//! function calls over messages.

pub mod config;
pub mod control;
pub mod driver;
pub mod function;
pub mod hub;
pub mod routing;
pub mod sink;
pub mod state;

mod error;
mod utils;

#[cfg(test)]
mod tests;

pub use control::{Control, ControlState, Controllable};
pub use driver::Driver;
pub use error::{Error, Result};
pub use function::{PendingCalls, add_function_tag, copy_function_tag, function_tag, is_reply_to};
pub use hub::Hub;
pub use sink::{Sink, SinkMode};
pub use state::{State, StateChange};

pub use switchboard_types::*;
