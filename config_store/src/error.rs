//! Error types for config store operations.

use data_model::ObjectKey;

/// Result type for config store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during config store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{object} not found")]
    NotFound { object: ObjectKey },

    #[error("{object} already exists")]
    AlreadyExists { object: ObjectKey },

    #[error("{object} is {size} bytes encoded, over the {limit} byte object limit")]
    TooLarge {
        object: ObjectKey,
        size: usize,
        limit: usize,
    },

    #[error("invalid object name {object}")]
    InvalidName { object: ObjectKey },

    #[error("label {key}={value:?} of {object} is not a valid label value")]
    InvalidLabel {
        object: ObjectKey,
        key: String,
        value: String,
    },

    #[error("access to {object} was denied: {source}")]
    Unauthorized {
        object: ObjectKey,
        #[source]
        source: object_store::Error,
    },

    #[error("invalid store url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to decode {object}: {source}")]
    Decode {
        object: ObjectKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode object: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),
}

impl StoreError {
    /// Maps a backend error on `object` into the store's vocabulary.
    pub(crate) fn from_backend(object: &ObjectKey, err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StoreError::NotFound {
                object: object.clone(),
            },
            object_store::Error::AlreadyExists { .. } => StoreError::AlreadyExists {
                object: object.clone(),
            },
            err @ (object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }) => StoreError::Unauthorized {
                object: object.clone(),
                source: err,
            },
            err => StoreError::Backend(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
