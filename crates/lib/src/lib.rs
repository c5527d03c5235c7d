//!
//! Superscore: capture, browse and restore snapshots of control-system
//! process variables.
//!
//! ## Core Concepts
//!
//! * **Entries (`entry::Entry`)**: The persisted unit of data. Parameters name
//!   the PVs to capture, collections group them, and snapshots hold the
//!   setpoints and readbacks captured from a collection.
//! * **Backends (`backend::Backend`)**: Pluggable storage for entries: a
//!   single JSON filestore, a directory of per-entry files, or an in-memory
//!   test backend.
//! * **Control layer (`control::ControlLayer`)**: Reads and writes live PV
//!   values through protocol shims.
//! * **Client (`client::Client`)**: Ties a backend to a control layer,
//!   enforces the session's writability policy, and takes and applies
//!   snapshots.
//! * **Templates (`templates`)**: Turn collections into reusable templates
//!   with `{{placeholder}}` text, and fill them in again.

pub mod backend;
pub mod client;
pub mod clock;
pub mod compare;
pub mod control;
pub mod entry;
pub mod templates;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::Client;
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use entry::{Entry, ID};

/// Result type used throughout the superscore library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the superscore library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Malformed identifiers
    #[error(transparent)]
    Id(entry::IdError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Structured errors from the control layer
    #[error(transparent)]
    Control(control::ControlError),

    /// Configuration discovery and parsing errors
    #[error(transparent)]
    Config(client::ConfigError),

    /// Placeholder template errors
    #[error(transparent)]
    Template(templates::TemplateError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Id(_) => "entry",
            Error::Backend(_) => "backend",
            Error::Control(_) => "control",
            Error::Config(_) => "config",
            Error::Template(_) => "templates",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::Config(config_err) => config_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_already_exists(),
            _ => false,
        }
    }

    /// Check if the caller's copy of an entry was stale.
    pub fn is_out_of_sync(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_out_of_sync(),
            _ => false,
        }
    }

    /// Check if a write was refused by the backend or session policy.
    pub fn is_not_writable(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_writable(),
            _ => false,
        }
    }

    /// Check if this error is backend-related.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error came from talking to the control system.
    pub fn is_control_error(&self) -> bool {
        matches!(self, Error::Control(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            Error::Config(client::ConfigError::Read { .. }) => true,
            _ => false,
        }
    }
}
