//! Error types for the registry and the storage seam beneath it.

use thiserror::Error;

/// Errors surfaced by [`MappingRegistry`](crate::MappingRegistry) operations.
///
/// None of these are retried internally.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MappingError {
    /// The namespace token does not round-trip through the catalog.
    #[error("no mapping type named '{0}'")]
    InvalidMappingType(String),

    /// The store holds no index for a valid type (not provisioned).
    #[error("no mapping index saved for mapping type '{token}'")]
    IndexUnavailable { token: &'static str },

    #[error("no mapping with id {id} in mapping type '{token}'")]
    MappingNotFound { token: &'static str, id: u32 },

    /// Every `u32` id is already taken in this type.
    #[error("mapping type '{token}' has no free id left")]
    IndexExhausted { token: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors reported by a [`MappingStore`](crate::MappingStore).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapping index '{token}' is not provisioned")]
    Unprovisioned { token: &'static str },

    #[error("mapping index '{token}' is already provisioned")]
    AlreadyProvisioned { token: &'static str },

    #[error("mapping index '{token}' already holds id {id}")]
    DuplicateId { token: &'static str, id: u32 },

    #[error("record of type '{found}' cannot be stored in index '{expected}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("mapping name of {len} bytes exceeds the {max} byte limit")]
    NameTooLong { len: usize, max: usize },

    #[error("corrupt mapping index '{token}': {reason}")]
    Corrupt { token: &'static str, reason: String },
}
