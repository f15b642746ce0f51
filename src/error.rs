use thiserror::Error;

/// Errors raised while maintaining the local mirror of the source repository.
///
/// None of these are fatal: the scheduler logs them and retries on the next tick.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Clone or pull against the upstream repository failed
    #[error("Source repository unavailable during {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },

    /// The git process could not be spawned or the local filesystem failed
    #[error("Mirror I/O error: {0}")]
    Io(String),
}

impl SyncError {
    pub(crate) fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        SyncError::Unavailable {
            operation,
            message: message.into(),
        }
    }
}

/// Errors that abort the derivative build of a single source image.
///
/// The batch the image belongs to carries on with the remaining images.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// Source file could not be read from the mirror
    #[error("Failed to read source image {path}: {message}")]
    Read { path: String, message: String },

    /// Source bytes are not a decodable image
    #[error("Failed to decode source image: {message}")]
    DecodeError { message: String },

    /// Encoding a derivative failed
    #[error("Failed to encode derivative: {message}")]
    EncodeError { message: String },

    /// A blocking worker panicked or was cancelled
    #[error("Derivative worker failed: {message}")]
    Worker { message: String },
}

/// Errors raised by the derivative store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No connection could be checked out of the pool
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command
    #[error("Store command error: {0}")]
    Command(String),

    /// A stored value could not be decoded back into bytes
    #[error("Corrupt payload for {key} field {field}: {message}")]
    Payload {
        key: String,
        field: String,
        message: String,
    },
}

/// Errors surfaced on the request path.
///
/// Every variant maps to a 404 or a 500; no internal detail reaches the client.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Unknown identifier, or the resolved resolution is not stored
    #[error("Image not found: {identifier} ({label})")]
    NotFound { identifier: String, label: String },

    /// The request could not be served because of an internal failure
    #[error("Internal error: {message}")]
    Internal { message: String },
}
