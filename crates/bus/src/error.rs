use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The target queue has not been declared, or was deleted
    /// (e.g. an RPC reply queue released after a timeout).
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The message body could not be understood and must not be redelivered.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The message was produced with a schema version this build cannot read.
    #[error("Unsupported schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: u64, supported: u32 },

    /// No correlated reply arrived within the allotted time.
    #[error("RPC to queue '{queue}' timed out after {timeout:?}")]
    RpcTimeout { queue: String, timeout: Duration },

    /// The RPC client was shut down while the call was in flight.
    #[error("RPC client closed")]
    RpcClosed,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Returns true if the error means the message itself is bad (poison message).
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            BusError::MalformedMessage(_) | BusError::UnsupportedSchemaVersion { .. }
        )
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
