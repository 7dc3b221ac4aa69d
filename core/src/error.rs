//! Error types for the netlab-core crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid project file: {0}")]
    InvalidFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Could not bind with {host}: {source} (check the host binding setting)")]
    HostUnreachable {
        host: String,
        source: std::io::Error,
    },

    #[error("Something other than a netlab server is already running on {host} port {port}, adjust the local server port setting")]
    PortConflict { host: String, port: u16 },

    #[error("No local server is configured")]
    NoServerConfigured,

    #[error("Could not find local server {}", .0.display())]
    ServerBinaryMissing(PathBuf),

    #[error("{} is not an executable", .0.display())]
    ServerBinaryNotExecutable(PathBuf),

    #[error("Could not start the local server process {}: {}", .path.display(), .source)]
    SpawnFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not connect to the local server {host} on port {port}: {source}")]
    HandshakeFailed {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("Stop the following nodes before saving the topology to a new location: {}", .0.join(", "))]
    NodesRunning(Vec<String>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No topology converter is available to open legacy project files")]
    ConverterUnavailable,

    #[error("Could not convert {}: {}", .path.display(), .message)]
    ConvertFailed { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}
