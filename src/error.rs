//! Error types for the Manager client

use crate::dialplan::DialplanError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type AmiResult<T> = Result<T, AmiError>;

/// Errors surfaced by the Manager client.
///
/// Every public operation fails with exactly one of these. Codec and
/// correlation errors mean the stream is out of sync and are never retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// A non-blank line lacked the `Key: Value` separator.
    #[error("malformed packet line: {line:?}")]
    MalformedPacket { line: String },

    /// Response/event correlation violated or packet shape unexpected.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The PBX answered `Response: Error`.
    #[error("action {action} failed: {message}")]
    ActionFailed { action: String, message: String },

    /// A response or collection did not finish before its deadline.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Transport failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport reached EOF or the reader task exited.
    #[error("connection closed")]
    ConnectionClosed,

    /// The client was used after the connection went down.
    #[error("not connected")]
    NotConnected,

    /// Unscoped events were dropped because the event stream was not drained.
    #[error("event queue full, events were dropped")]
    QueueFull,

    /// Data read from the PBX does not form a valid dialplan.
    #[error(transparent)]
    Dialplan(#[from] DialplanError),
}

impl AmiError {
    /// Build a [`AmiError::Protocol`] from any message.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        AmiError::Protocol {
            message: message.into(),
        }
    }

    /// Build a [`AmiError::ActionFailed`].
    pub fn action_failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        AmiError::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }

    /// `true` for `Response: Error` failures, which callers may recover from.
    pub fn is_action_failed(&self) -> bool {
        matches!(self, AmiError::ActionFailed { .. })
    }

    /// `true` when the underlying connection is unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AmiError::Io(_) | AmiError::ConnectionClosed | AmiError::NotConnected
        )
    }
}
