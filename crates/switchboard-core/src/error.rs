use switchboard_types::ValueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Function call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Control is not connected")]
    NotConnected,

    #[error("No such state variable: {context}/{var}")]
    NoSuchVariable { context: String, var: String },

    #[error("Unsupported value: {0}")]
    UnsupportedType(#[from] ValueError),

    #[error("Invalid range for {context}/{var}")]
    InvalidRange { context: String, var: String },

    #[error("Malformed message: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
