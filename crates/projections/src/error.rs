//! Projection error types.

use domain::OrderError;
use thiserror::Error;

/// Errors that can occur while updating a projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The change violates the order state machine.
    #[error(transparent)]
    Transition(#[from] OrderError),

    /// A notification could not be delivered.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
