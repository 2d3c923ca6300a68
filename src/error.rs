//! Error types for the network audio adapter

use thiserror::Error;

/// Main error type for the adapter
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Ring buffer and port errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Buffer overflow")]
    BufferOverflow,

    #[error("Buffer underrun")]
    BufferUnderrun,

    #[error("Invalid channel: {0}")]
    InvalidChannel(usize),
}

/// Errors reported by a network transport session.
///
/// Every variant is fatal for the execution loop. A missed sync packet is
/// not an error, see [`crate::network::SyncOutcome::Missed`].
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Handshake with master failed: {0}")]
    HandshakeFailed(String),

    #[error("Connection to master lost: {0}")]
    ConnectionLost(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Timeout")]
    Timeout,
}

/// Lifecycle errors of the adapter and its real-time loop
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Adapter is already running")]
    AlreadyRunning,

    #[error("Operation not allowed while running")]
    Running,

    #[error("Failed to spawn real-time thread: {0}")]
    SpawnFailed(String),

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("First cycle failed: {0}")]
    FirstCycleFailed(String),

    #[error("Real-time thread exited unexpectedly")]
    ThreadLost,
}

/// Non-fatal configuration problem; the affected field keeps its default.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    #[error("Can't use multicast address {value}, using default {default}")]
    AddressTooLong { value: String, default: String },

    #[error("Unknown network mode '{0}', using 'normal' mode")]
    UnknownNetworkMode(String),

    #[error("Invalid value '{value}' for {key}, keeping {fallback}")]
    InvalidValue {
        key: &'static str,
        value: String,
        fallback: String,
    },

    #[error("Client name '{value}' too long, truncated to '{truncated}'")]
    ClientNameTruncated { value: String, truncated: String },
}

/// Result type alias for the adapter
pub type Result<T> = std::result::Result<T, Error>;
