//! The error taxonomy from the design (configuration, handler, raw-handler,
//! decode, and cancellation errors). Modelled as tagged Rust types rather
//! than an exception class hierarchy: see [`crate::exception`] for how
//! "most specific ancestor wins" dispatch is expressed over these types.

use std::fmt;

/// Raised while building or freezing a [`crate::container::Container`] or
/// [`crate::server::Server`]: invalid rule patterns, mount cycles,
/// registration after freeze. Always fatal at configure/start time; never
/// reaches the wire.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid glob pattern {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("mounting this container would introduce a cycle")]
    MountCycle,

    #[error("cannot register on a container or server that has already been frozen by run()")]
    AlreadyFrozen,

    #[error("empty pattern is not a valid rule")]
    EmptyPattern,
}

/// Raised by user middleware, a user handler, or a user hook while
/// processing a decoded [`crate::query::Query`]. Caught by the query-stack
/// exception-handler middleware (see [`crate::exception`]).
#[derive(Debug)]
pub struct HandlerError {
    pub class: ErrorClass,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        class: ErrorClass,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            class,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// `NotImplementedError`-equivalent: a handler that declines to answer
    /// a query type it was registered for.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotImplemented, message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

/// Raised by user raw middleware, or re-raised when a query-exception
/// handler itself fails. Caught by the raw-stack exception-handler
/// middleware.
#[derive(Debug)]
pub struct RawHandlerError {
    pub class: ErrorClass,
    pub message: String,
}

impl RawHandlerError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for RawHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RawHandlerError {}

/// The wire codec rejected a record. Produces `FORMERR` via the default raw
/// handler.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode DNS wire message: {0}")]
pub struct DecodeError(pub String);

/// The originating connection closed, or a per-request timeout expired.
/// Delivered to the query stack as a [`HandlerError`] of class
/// [`ErrorClass::RequestCancelled`]; never aborts a handler mid-step, only
/// observed at the next suspension point.
#[derive(Debug, thiserror::Error)]
#[error("request cancelled: {0}")]
pub struct RequestCancelled(pub String);

/// Ancestry-walk key for exception dispatch (§4.5). `Error` is the root;
/// every other variant's ancestry passes through it. This is a flat
/// enumeration standing in for the open-ended class hierarchy of the
/// source design: see [`crate::exception::ExceptionTable`] for how a
/// finite set of `(predicate, handler)` pairs sorted by specificity
/// reproduces "most specific ancestor wins" over this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The root of the ancestry chain. A handler registered for `Error`
    /// is the default/terminal fallback.
    Error,
    NotImplemented,
    RequestCancelled,
    /// The wire codec rejected a record downstream of the initial parse
    /// (e.g. a raw middleware's deeper validation). The default raw
    /// exception handler maps this class to `FORMERR` specifically,
    /// everything else to `SERVFAIL` (spec §7).
    Decode,
    /// Catch-all for application errors that don't fit a more specific
    /// class; still a child of `Error`.
    Handler,
}

impl ErrorClass {
    /// The ancestry chain for this class, most specific first, ending at
    /// the root. Mirrors a single-inheritance `class(e)` chain.
    pub fn ancestry(self) -> &'static [ErrorClass] {
        use ErrorClass::*;
        match self {
            Error => &[Error],
            NotImplemented => &[NotImplemented, Error],
            RequestCancelled => &[RequestCancelled, Error],
            Decode => &[Decode, Error],
            Handler => &[Handler, Error],
        }
    }
}
