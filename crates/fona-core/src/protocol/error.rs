//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the modem
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No reply within the allowed time
    #[error("Timed out while waiting for a response from the modem")]
    Timeout,

    #[error("Command {command} expected '{expected}' but received '{actual}'")]
    /// The modem answered, but not with what the command expects
    ProtocolMismatch {
        /// Command that was sent
        command: String,
        /// Reply that was required
        expected: String,
        /// Reply that arrived
        actual: String,
    },

    #[error("Malformed reply to {command}: {reason}")]
    /// A reply could not be parsed
    MalformedReply {
        /// Command whose reply was bad
        command: String,
        /// What was wrong with it
        reason: String,
    },

    /// The GPIO line for this is not wired
    #[error("Hardware capability not supported: {0}")]
    NotSupported(&'static str),

    /// `reset` could not bring the modem up
    #[error("Modem bring-up failed: {0}")]
    Fatal(#[source] Box<ProtocolError>),

    /// Rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device has been dropped
    #[error("Device session closed")]
    Closed,

    /// Transport or file I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for [`ProtocolError::Timeout`]. Timeouts are worth retrying while the
    /// modem is still locking onto the line rate; mismatches usually are not.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout)
    }

    pub(crate) fn malformed(command: &str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedReply {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}
