//! Error types for ROOT container access.

/// Low-level ROOT reading/writing error.
#[derive(Debug, thiserror::Error)]
pub enum RootError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the `root` magic.
    #[error("not a ROOT file (bad magic)")]
    BadMagic,

    /// Attempted to read past the end of a buffer.
    #[error("buffer underflow at offset {offset}: need {need} bytes, have {have}")]
    BufferUnderflow {
        /// Read position.
        offset: usize,
        /// Bytes requested.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Malformed or unexpected object layout.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression block could not be decoded.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// No key with this name in the directory.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The stored class is not handled by the decoder that was asked.
    #[error("unsupported class: {0}")]
    UnsupportedClass(String),

    /// Object could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for ROOT container operations.
pub type Result<T> = std::result::Result<T, RootError>;

impl From<RootError> for jetana_core::Error {
    fn from(e: RootError) -> Self {
        use jetana_core::Error;
        match e {
            RootError::KeyNotFound(name) => Error::NotFound(name),
            RootError::UnsupportedClass(class) => Error::UnsupportedShape(class),
            RootError::Io(err) => Error::Io(err),
            other => Error::IoFailure(other.to_string()),
        }
    }
}
