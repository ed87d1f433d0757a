mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{BusConfig, DriverConfig, FunctionConfig, QueueConfig, RoutingConfig};
pub use validation::warn_unknown_fields;
