//! Error types for mxdispatch.

use crate::abi::{ImplKind, PluginUid};
use crate::backend::LoadError;
use crate::status::Status;
use crate::version::ApiVersion;
use thiserror::Error;

/// Result type alias using mxdispatch's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dispatcher operations.
///
/// Each variant maps onto exactly one wire [`Status`] via [`Error::status`].
/// Backend failures that have no dedicated variant travel unchanged in
/// [`Error::Backend`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The session handle is not usable (closed, or foreign to this backend).
    #[error("invalid session handle")]
    InvalidHandle,

    /// Close was called on a session that is already closed.
    #[error("session already closed")]
    AlreadyClosed,

    /// A required pointer was null.
    #[error("null pointer")]
    NullPointer,

    /// A parameter was out of range.
    #[error("invalid parameter")]
    InvalidParameter,

    /// The operation is absent from this session's function table.
    #[error("operation not implemented by the bound backend")]
    NotImplemented,

    /// The session has not finished initialization.
    #[error("session not initialized")]
    NotInitialized,

    /// Every catalog candidate was rejected during init.
    #[error("no implementation matches kind {} at API {version}", kind_label(.kind))]
    NoMatchingImplementation {
        /// Requested kind, `None` for any.
        kind: Option<ImplKind>,
        /// Requested API version.
        version: ApiVersion,
    },

    /// Backend memory allocation failed.
    #[error("memory allocation failed")]
    MemoryAllocation,

    /// The backend needs more input; expected while draining.
    #[error("more data needed")]
    MoreData,

    /// The caller-provided output buffer is too small.
    #[error("output buffer too small")]
    NotEnoughBuffer,

    /// The call sequence is not allowed in the current state.
    #[error("undefined behavior")]
    UndefinedBehavior,

    /// The backend failed without a finer classification.
    #[error("unknown error")]
    Unknown,

    /// The backend does not support the request.
    #[error("unsupported")]
    Unsupported,

    /// Close was refused because other sessions are still joined.
    #[error("{0} joined session(s) must be disjoined first")]
    JoinedChildren(usize),

    /// No plugin with this identifier is known or loaded.
    #[error("plugin {0} not found")]
    PluginNotFound(PluginUid),

    /// A backend or plugin module could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Any other status reported by a backend.
    #[error("backend error: {0}")]
    Backend(Status),
}

fn kind_label(kind: &Option<ImplKind>) -> &'static str {
    kind.map_or("any", ImplKind::as_str)
}

impl Error {
    /// The wire status that represents this error.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidHandle | Self::AlreadyClosed => Status::ERR_INVALID_HANDLE,
            Self::NullPointer => Status::ERR_NULL_PTR,
            Self::InvalidParameter => Status::ERR_INVALID_VIDEO_PARAM,
            Self::NotImplemented => Status::ERR_NOT_IMPLEMENTED,
            Self::NotInitialized => Status::ERR_NOT_INITIALIZED,
            Self::NoMatchingImplementation { .. } | Self::Unsupported => Status::ERR_UNSUPPORTED,
            Self::MemoryAllocation => Status::ERR_MEMORY_ALLOC,
            Self::MoreData => Status::ERR_MORE_DATA,
            Self::NotEnoughBuffer => Status::ERR_NOT_ENOUGH_BUFFER,
            Self::UndefinedBehavior | Self::JoinedChildren(_) => Status::ERR_UNDEFINED_BEHAVIOR,
            Self::Unknown => Status::ERR_UNKNOWN,
            Self::PluginNotFound(_) | Self::Load(_) => Status::ERR_NOT_FOUND,
            Self::Backend(status) => *status,
        }
    }

    /// Classify an error status reported by a backend.
    ///
    /// `Error::from_status(s).status() == s` for every negative `s`.
    pub fn from_status(status: Status) -> Self {
        match status {
            Status::ERR_INVALID_HANDLE => Self::InvalidHandle,
            Status::ERR_NULL_PTR => Self::NullPointer,
            Status::ERR_INVALID_VIDEO_PARAM => Self::InvalidParameter,
            Status::ERR_NOT_IMPLEMENTED => Self::NotImplemented,
            Status::ERR_NOT_INITIALIZED => Self::NotInitialized,
            Status::ERR_UNSUPPORTED => Self::Unsupported,
            Status::ERR_MEMORY_ALLOC => Self::MemoryAllocation,
            Status::ERR_MORE_DATA => Self::MoreData,
            Status::ERR_NOT_ENOUGH_BUFFER => Self::NotEnoughBuffer,
            Status::ERR_UNDEFINED_BEHAVIOR => Self::UndefinedBehavior,
            Status::ERR_UNKNOWN => Self::Unknown,
            other => Self::Backend(other),
        }
    }

    /// Whether the caller is expected to retry or continue.
    ///
    /// `MoreData` during a drain and `NotEnoughBuffer` with a larger buffer
    /// are part of normal streaming.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MoreData | Self::NotEnoughBuffer)
    }
}
