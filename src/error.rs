//! Error types for the DHCP server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.
//!
//! Pool exhaustion is deliberately not represented here: "no free address"
//! is a normal protocol outcome (NAK or silence), surfaced as the `None`
//! branch of the lease-table API rather than as an error.

/// Errors that can occur during DHCP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (configuration file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed DHCP packet received.
    ///
    /// Packets that are too short, have an invalid magic cookie, or carry
    /// an option whose declared length overruns the buffer. Decode errors
    /// are logged and dropped at the server loop; they never stop the
    /// service.
    #[error("invalid DHCP packet: {0}")]
    Decode(String),

    /// Invalid server configuration.
    ///
    /// Bad pool bounds, a zero lease TTL, or a malformed static-lease file.
    /// Fatal at startup, before the socket is opened.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically binding to port 67 without sufficient privileges.
    #[error("socket error: {0}")]
    Socket(String),

    /// The supervised external DHCP daemon failed to start or stop.
    #[error("daemon error: {0}")]
    Daemon(String),
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
