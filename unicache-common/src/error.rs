//! # Unified Error
//!
//! Purpose: Collapse every failure a driver can hit (transport, protocol,
//! server reply, codec, capability, argument validation) into one error type
//! that callers handle uniformly.
//!
//! ## Design Principles
//! 1. **Single Surface**: `CacheError` is the only error returned by the client API.
//! 2. **Cause Preservation**: The underlying failure is kept as `source()`.
//! 3. **Coarse Kinds**: `ErrorKind` separates the four failure classes without
//!    exposing driver-specific variants.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Result type used across the client API.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Boxed cause carried by `CacheError`.
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Failure class of a `CacheError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, protocol, or server-side failure.
    Backend,
    /// Operation is not available on the active driver.
    Unsupported,
    /// Value could not be encoded or decoded.
    Codec,
    /// Caller violated an argument contract; nothing was sent.
    IllegalArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Backend => "backend error",
            ErrorKind::Unsupported => "unsupported operation",
            ErrorKind::Codec => "codec error",
            ErrorKind::IllegalArgument => "illegal argument",
        };
        f.write_str(name)
    }
}

/// The single externally visible error of the cache client.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct CacheError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxedCause>,
}

impl CacheError {
    /// Wraps a backend failure, keeping it as the cause.
    pub fn backend<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CacheError {
            kind: ErrorKind::Backend,
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Wraps a codec failure, keeping it as the cause.
    pub fn codec(cause: CodecError) -> Self {
        CacheError {
            kind: ErrorKind::Codec,
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Capability failure raised before any network call.
    pub fn unsupported(message: impl Into<String>) -> Self {
        CacheError {
            kind: ErrorKind::Unsupported,
            message: message.into(),
            source: None,
        }
    }

    /// Argument contract violation raised before any network call.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        CacheError {
            kind: ErrorKind::IllegalArgument,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind == ErrorKind::Unsupported
    }

    pub fn is_illegal_argument(&self) -> bool {
        self.kind == ErrorKind::IllegalArgument
    }

    /// Returns the wrapped cause downcast to `E`, if it is one.
    pub fn cause_as<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_ref().and_then(|cause| cause.downcast_ref::<E>())
    }
}

impl From<CodecError> for CacheError {
    fn from(err: CodecError) -> Self {
        CacheError::codec(err)
    }
}

/// Serialization failures raised by key and value codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode codec: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("key is not valid utf-8: {0}")]
    InvalidKey(#[from] std::str::Utf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_keeps_cause() {
        let json_err = serde_json::from_slice::<u32>(b"not json").unwrap_err();
        let err = CacheError::from(CodecError::from(json_err));
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(err.source().is_some());
        assert!(err.cause_as::<CodecError>().is_some());
    }

    #[test]
    fn backend_error_displays_kind_and_exposes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CacheError::backend(io);
        assert_eq!(err.to_string(), "backend error: refused");
        let cause = err.source().expect("cause");
        assert_eq!(cause.to_string(), "refused");
        assert!(err.cause_as::<std::io::Error>().is_some());
        assert!(format!("{err:?}").contains("Backend"));
    }

    #[test]
    fn unsupported_has_no_cause() {
        let err = CacheError::unsupported("KEYS is not supported in cluster mode");
        assert!(err.is_unsupported());
        assert!(err.source().is_none());
        assert_eq!(
            err.to_string(),
            "unsupported operation: KEYS is not supported in cluster mode"
        );
    }
}
