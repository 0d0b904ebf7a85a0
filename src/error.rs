use thiserror::Error;

/// Errors raised by the object store gateway.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No object exists at the key
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Returns true if this error means the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised by the image codec.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Bytes could not be interpreted as an image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Raster could not be written in the requested format
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Client mistakes that are reported as "business validation failed".
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// File extension is not in the configured allow-list
    #[error("Unsupported image extension: {extension:?}.")]
    UnsupportedExtension { extension: String },

    /// Upload is larger than the configured maximum
    #[error("File too large. Limit: {max} bytes, got {size} bytes.")]
    FileTooLarge { size: u64, max: u64 },

    /// No original exists for the id
    #[error("Image with id {id} not found.")]
    NotFound { id: String },

    /// Uploaded bytes are not a loadable image
    #[error("Uploaded file is not a readable image: {message}")]
    UnreadableImage { message: String },
}

/// Errors returned by the variant engine operations.
#[derive(Debug, Clone, Error)]
pub enum VariantError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Requested variant is taller than the original
    #[error("Target height exceeds original: requested {target_height}, original is {original_height}.")]
    TargetHeightExceeded {
        target_height: u32,
        original_height: u32,
    },

    /// Requested variant height is not a positive integer
    #[error("Invalid target height: {target_height} (must be at least 1).")]
    InvalidTargetHeight { target_height: u32 },

    /// Request parameters that could not be parsed
    #[error("Invalid query parameters: {message}")]
    InvalidQuery { message: String },

    /// Codec failure against an object the service stored itself
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Gateway failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The caller's cancellation token fired before the operation finished
    #[error("Operation cancelled")]
    Cancelled,
}

impl VariantError {
    /// Shorthand for the not-found validation failure.
    pub fn not_found(id: impl Into<String>) -> Self {
        VariantError::Validation(ValidationError::NotFound { id: id.into() })
    }

    /// Returns true for failures caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VariantError::Validation(_)
                | VariantError::TargetHeightExceeded { .. }
                | VariantError::InvalidTargetHeight { .. }
                | VariantError::InvalidQuery { .. }
        )
    }
}
