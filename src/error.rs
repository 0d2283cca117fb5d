//! Error types shared by the driver protocol, the proxies and the recorder.

use std::fmt;

use thiserror::Error;

/// Boxed error produced by a concrete driver implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The nested levels of the driver protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Driver,
    Connector,
    Connection,
    Statement,
    Rows,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Driver => "driver",
            Layer::Connector => "connector",
            Layer::Connection => "connection",
            Layer::Statement => "statement",
            Layer::Rows => "rows",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors surfaced by this crate.
///
/// Errors raised by a wrapped driver travel through the proxies untouched,
/// so a caller sees exactly the value the driver returned.
#[derive(Debug, Error)]
pub enum Error {
    /// The wrapped object does not implement the requested optional operation.
    #[error("{layer} does not implement {capability}")]
    Unsupported {
        layer: Layer,
        capability: &'static str,
    },

    /// A context-aware call received a named parameter.
    #[error("driver does not support the use of named parameters (got `{name}`)")]
    NamedParameter { name: String },

    /// A proxy was asked to expose a capability the wrapped object lacks.
    #[error("cannot build {layer} proxy: wrapped object does not implement {capability}")]
    CapabilityMismatch {
        layer: Layer,
        capability: &'static str,
    },

    #[error("unknown driver {0:?} (is it registered?)")]
    UnknownDriver(String),

    #[error("driver {0:?} is already registered")]
    DuplicateDriver(String),

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("database is closed")]
    DatabaseClosed,

    #[error("no last insert id is available for this result")]
    NoLastInsertId,

    /// The recorder holds no events.
    #[error("no events are defined")]
    NoEvents,

    /// The final recorded event is not an HTTP response.
    #[error("final event should be an http response")]
    MissingFinalResponse,

    /// Error returned by a concrete driver implementation.
    #[error(transparent)]
    Driver(BoxError),
}

/// Result type for recorder and driver operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an error raised by a concrete driver.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        Error::Driver(err.into())
    }

    /// Returns the driver error, if this is one, for downcasting.
    pub fn as_driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Driver(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Check if the error came from a context cancellation or deadline.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Locked;

    impl fmt::Display for Locked {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("database is locked")
        }
    }

    impl std::error::Error for Locked {}

    #[test]
    fn test_driver_error_is_transparent() {
        let err = Error::driver(Locked);
        assert_eq!(err.to_string(), "database is locked");
        assert!(err
            .as_driver_error()
            .and_then(|e| e.downcast_ref::<Locked>())
            .is_some());
    }

    #[test]
    fn test_unsupported_message() {
        let err = Error::Unsupported {
            layer: Layer::Connection,
            capability: "ping",
        };
        assert_eq!(err.to_string(), "connection does not implement ping");
    }

    #[test]
    fn test_context_errors() {
        assert!(Error::Canceled.is_context_error());
        assert!(Error::DeadlineExceeded.is_context_error());
        assert!(!Error::DatabaseClosed.is_context_error());
    }
}
