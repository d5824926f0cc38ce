use thiserror::Error;

/// Result type for DFR22 operations
pub type Result<T> = std::result::Result<T, Dfr22Error>;

/// Errors that can occur when controlling a DFR22 unit
#[derive(Error, Debug)]
pub enum Dfr22Error {
    /// I/O error from the TCP transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// An operation that needs an address ran before `initialize`
    #[error("Client is not initialized")]
    NotInitialized,

    /// `initialize` was called on an already initialized client
    #[error("Client is already initialized")]
    AlreadyInitialized,

    /// `connect` was called while a session is connecting or connected
    #[error("Client is already {0}")]
    AlreadyConnected(&'static str),

    /// Host, port or another setting is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device id does not fit the three-digit wire tag
    #[error("Invalid device id {0}: must be between 0 and 999")]
    InvalidDeviceId(u16),

    /// Channel or mix-point index outside the unit's 2x2 layout
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The command does not apply to the requested target
    #[error("{operation} is not supported for {target}")]
    UnsupportedOperation {
        /// Operation that was requested
        operation: &'static str,
        /// Display form of the target
        target: String,
    },

    /// JSON configuration could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
