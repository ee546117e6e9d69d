//! Error handling for streamer sessions.
//!
//! Errors are categorised after gRPC status codes, so callers and logs can
//! tell a missing resource from an unreachable server without inspecting the
//! underlying error.
//!
//! Most of this crate never hands an error back to its caller: discovery
//! failures and playback rejections are logged and turned into observable
//! state. The [`struct@Error`] type is what the collaborator traits
//! ([`Transport`](crate::transport::Transport),
//! [`Player`](crate::player::Player)) return, and what configuration loading
//! fails with.
//!
//! # Example
//!
//! ```rust
//! use streamer_session::error::{Error, ErrorKind, Result};
//!
//! fn lookup(uri: &str) -> Result<()> {
//!     if uri.is_empty() {
//!         return Err(Error::invalid_argument("resource uri is empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// Returns `None` when the underlying error is of another type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for streamer session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// The operation was cancelled, typically by the caller.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// An error without a better fitting category.
    #[error("unknown error")]
    Unknown = 2,

    /// The caller specified an invalid argument.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// The deadline expired before the operation could complete.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// Some requested resource was not found.
    #[error("not found")]
    NotFound = 5,

    /// The caller does not have permission to execute the operation.
    #[error("permission denied")]
    PermissionDenied = 7,

    /// The system is not in a state required for the operation.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// The operation was aborted, typically by the peer.
    #[error("operation aborted")]
    Aborted = 10,

    /// The operation is not implemented or not supported by the server.
    #[error("not implemented")]
    Unimplemented = 12,

    /// An invariant expected by the implementation was broken.
    #[error("internal error")]
    Internal = 13,

    /// The server is currently unavailable.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "no such streamer");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for operations the peer aborted mid-execution.
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Aborted, error)
    }

    /// Creates an error for operations that were cancelled before
    /// completion, for example because their connection went away.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for responses that could not be made sense of.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for requests or negotiations that exceeded their
    /// deadline.
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for operations that cannot proceed in the current
    /// state, such as requesting a list while disconnected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::failed_precondition("not connected");
    /// assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    /// ```
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for broken internal invariants.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for arguments that don't meet validation
    /// requirements, such as a malformed configuration value.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for resources the server does not know.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for requests the server refused to serve.
    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    /// Creates an error for methods the server does not support.
    pub fn unimplemented<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unimplemented, error)
    }

    /// Creates an error for an unreachable server.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error that fits no other category.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error as "{kind}: {details}".
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// Configuration files are the only IO this crate performs itself, so the
/// mapping concentrates on what opening and reading a file can yield.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::{
            ConnectionAborted, ConnectionRefused, ConnectionReset, Interrupted, InvalidData,
            InvalidInput, NotConnected, NotFound, PermissionDenied, TimedOut, UnexpectedEof,
        };
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            ConnectionRefused | NotConnected => Self::unavailable(err),
            ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::unknown(err),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e)
    }
}
