//! Error types for DL24 operations.

use thiserror::Error;

/// Result type alias for DL24 operations.
pub type Result<T> = std::result::Result<T, Dl24Error>;

/// Error types for DL24 communication and control.
#[derive(Error, Debug)]
pub enum Dl24Error {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The session index was not learned and broadcast mode was not accepted
    #[error("Session index unresolved; learn again or allow broadcast addressing")]
    UnresolvedSessionIndex,

    /// Session index outside the candidate set
    #[error("Invalid session index: {0}")]
    InvalidSessionIndex(u8),

    /// Transport-level failure reported by a collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Data parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}
