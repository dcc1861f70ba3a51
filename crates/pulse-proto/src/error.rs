//! Error types for the pulse-proto crate.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a message.
    #[error("decoding error: {0}")]
    Decoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtoError::Decoding("unexpected end of input".to_string());
        assert_eq!(err.to_string(), "decoding error: unexpected end of input");

        let err = ProtoError::Encoding("bad float".to_string());
        assert_eq!(err.to_string(), "encoding error: bad float");
    }
}
