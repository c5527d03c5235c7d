//! Error types for control-layer operations.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the control system.
///
/// Cloneable so a failed put can be reported to every holder of its
/// [`TaskStatus`](super::TaskStatus).
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    /// The transport failed to read or write a process variable.
    #[error("Communication with {address} failed: {reason}")]
    Communication {
        /// The address being accessed
        address: String,
        /// Transport diagnostic
        reason: String,
    },

    /// No shim is loaded for the address's protocol prefix.
    #[error("Unsupported protocol for address {address}")]
    UnsupportedProtocol {
        /// The offending address
        address: String,
    },

    /// Batch arguments of different lengths.
    #[error("Arguments are of different length: addresses({addresses}), values({values}), callbacks({callbacks})")]
    LengthMismatch {
        addresses: usize,
        values: usize,
        callbacks: usize,
    },

    /// The operation did not complete in time.
    #[error("Timed out after {after:?}")]
    Timeout {
        /// The elapsed limit
        after: Duration,
    },
}

impl ControlError {
    /// Check if this error came from the transport itself.
    pub fn is_communication_error(&self) -> bool {
        matches!(self, ControlError::Communication { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ControlError::Timeout { .. })
    }

    /// Check if the request was rejected before reaching a transport.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            ControlError::UnsupportedProtocol { .. } | ControlError::LengthMismatch { .. }
        )
    }

    /// The address involved, when the error concerns a single one.
    pub fn address(&self) -> Option<&str> {
        match self {
            ControlError::Communication { address, .. }
            | ControlError::UnsupportedProtocol { address } => Some(address),
            _ => None,
        }
    }
}

impl From<ControlError> for crate::Error {
    fn from(err: ControlError) -> Self {
        crate::Error::Control(err)
    }
}
