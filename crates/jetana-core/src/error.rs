//! Error types for jetana

use std::fmt;

use thiserror::Error;

/// jetana error type
#[derive(Error, Debug)]
pub enum Error {
    /// Named object or file is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// File could not be opened, read or decoded.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be read (corrupt or truncated container).
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// The stored object is not a recognized 1D/2D/3D/sparse N-D histogram.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// The histogram exists but has the wrong kind or dimensionality.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Caller-supplied parameter outside the recognized enumeration or missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Projection onto more axes than supported.
    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    /// The reduction produced a shape inconsistent with the request.
    #[error("degenerate projection: {0}")]
    DegenerateProjection(String),

    /// Numerical computation failed (e.g. a slice fit).
    #[error("computation error: {0}")]
    Computation(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl Error {
    /// Whether this error signals a missing object or file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions reported to the diagnostic stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A normalization was requested on a histogram whose integral is ≤ 0.
    EmptyHistogram {
        /// Name of the histogram left unmodified.
        name: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyHistogram { name } => {
                write!(f, "histogram '{}' has non-positive integral; left unmodified", name)
            }
        }
    }
}

impl Warning {
    /// Emit the warning on the `log` facade.
    pub fn report(&self) {
        log::warn!("{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection_covers_io() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_not_found());
        assert!(Error::NotFound("h".into()).is_not_found());
        assert!(!Error::InvalidArgument("x".into()).is_not_found());
    }

    #[test]
    fn warning_message_names_histogram() {
        let w = Warning::EmptyHistogram { name: "hEmpty".into() };
        assert!(w.to_string().contains("hEmpty"));
    }
}
