//! Error types for backend operations.
//!
//! Every backend variant raises the same taxonomy so callers can react to
//! failures without knowing which storage is in use.

use crate::entry::ID;
use thiserror::Error;

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// No entry with this id exists.
    #[error("Entry not found: {id}")]
    EntryNotFound {
        /// The missing id
        id: ID,
    },

    /// Attempted to save an entry whose id is already taken.
    #[error("Entry already exists: {id}")]
    EntryExists {
        /// The colliding id
        id: ID,
    },

    /// The caller's copy does not match the stored entry.
    #[error("Entry {id} is out of sync with the backend")]
    OutOfSync {
        /// The stale entry
        id: ID,
    },

    /// Deletion refused because the entry still has children.
    #[error("Entry {id} has children; delete them first or cascade")]
    HasChildren {
        /// The entry that still has children
        id: ID,
    },

    /// The entry may not be written in this session or by this backend.
    #[error("Entry {id} is not writable")]
    NotWritable {
        /// The protected entry
        id: ID,
    },

    /// The submitted entry is structurally invalid.
    #[error("Invalid entry: {reason}")]
    InvalidEntry {
        /// What is wrong with it
        reason: String,
    },

    /// A reference points somewhere it may not.
    #[error("Invalid reference to {id}: {reason}")]
    InvalidReference {
        /// The referenced id
        id: ID,
        /// Why the reference is rejected
        reason: String,
    },

    /// A search term could not be evaluated.
    #[error("Invalid search: {reason}")]
    InvalidSearch {
        /// Why the term was rejected
        reason: String,
    },

    /// No backend is registered under this name.
    #[error("Unknown backend type: {name}")]
    UnknownBackend {
        /// The requested name
        name: String,
    },

    /// The backend cannot be opened with the given settings.
    #[error("Invalid backend configuration: {reason}")]
    InvalidConfiguration {
        /// What is missing or wrong
        reason: String,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// Check if this error indicates an entry was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::EntryNotFound { .. })
    }

    /// Check if this error indicates the entry already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::EntryExists { .. })
    }

    /// Check if the caller's copy is stale.
    pub fn is_out_of_sync(&self) -> bool {
        matches!(self, BackendError::OutOfSync { .. })
    }

    /// Check if the operation was refused by a writability rule.
    pub fn is_not_writable(&self) -> bool {
        matches!(self, BackendError::NotWritable { .. })
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
        )
    }

    /// Check if the request itself was malformed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            BackendError::InvalidEntry { .. }
                | BackendError::InvalidReference { .. }
                | BackendError::InvalidSearch { .. }
                | BackendError::UnknownBackend { .. }
                | BackendError::InvalidConfiguration { .. }
        )
    }

    /// Get the entry ID if this error is about a specific entry.
    pub fn entry_id(&self) -> Option<&ID> {
        match self {
            BackendError::EntryNotFound { id }
            | BackendError::EntryExists { id }
            | BackendError::OutOfSync { id }
            | BackendError::HasChildren { id }
            | BackendError::NotWritable { id }
            | BackendError::InvalidReference { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
