//! Status codes exchanged with backends.
//!
//! Every native entry point returns a [`Status`]. Zero is success, negative
//! values are errors and positive values are warnings. The dispatcher never
//! reinterprets a backend status; it only sorts it into `Ok`/`Err`.

use crate::error::{Error, Result};
use std::fmt;

/// A raw status code as returned by a backend entry point.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Status(pub i32);

impl Status {
    /// Success.
    pub const NONE: Status = Status(0);

    /// Unknown error.
    pub const ERR_UNKNOWN: Status = Status(-1);
    /// A required pointer was null.
    pub const ERR_NULL_PTR: Status = Status(-2);
    /// Feature or parameter combination unsupported.
    pub const ERR_UNSUPPORTED: Status = Status(-3);
    /// Allocation failed.
    pub const ERR_MEMORY_ALLOC: Status = Status(-4);
    /// Output buffer too small.
    pub const ERR_NOT_ENOUGH_BUFFER: Status = Status(-5);
    /// Invalid session or object handle.
    pub const ERR_INVALID_HANDLE: Status = Status(-6);
    /// Failed to lock a memory block.
    pub const ERR_LOCK_MEMORY: Status = Status(-7);
    /// Component used before initialization.
    pub const ERR_NOT_INITIALIZED: Status = Status(-8);
    /// Object not found.
    pub const ERR_NOT_FOUND: Status = Status(-9);
    /// More input is required before output can be produced.
    pub const ERR_MORE_DATA: Status = Status(-10);
    /// More output surfaces are required.
    pub const ERR_MORE_SURFACE: Status = Status(-11);
    /// Operation aborted.
    pub const ERR_ABORTED: Status = Status(-12);
    /// Device lost.
    pub const ERR_DEVICE_LOST: Status = Status(-13);
    /// Parameters conflict with the current configuration.
    pub const ERR_INCOMPATIBLE_VIDEO_PARAM: Status = Status(-14);
    /// Parameters are out of range.
    pub const ERR_INVALID_VIDEO_PARAM: Status = Status(-15);
    /// Call sequence leads to undefined behavior.
    pub const ERR_UNDEFINED_BEHAVIOR: Status = Status(-16);
    /// Device failure.
    pub const ERR_DEVICE_FAILED: Status = Status(-17);
    /// Operation is not available in this session.
    pub const ERR_NOT_IMPLEMENTED: Status = Status(-99);

    /// Asynchronous operation is still running.
    pub const WRN_IN_EXECUTION: Status = Status(1);
    /// Device is busy, retry later.
    pub const WRN_DEVICE_BUSY: Status = Status(2);
    /// Parameters were adjusted to fit the current configuration.
    pub const WRN_VIDEO_PARAM_CHANGED: Status = Status(3);
    /// Value was partially accepted.
    pub const WRN_PARTIAL_ACCELERATION: Status = Status(4);
    /// Parameters were corrected by the backend.
    pub const WRN_INCOMPATIBLE_VIDEO_PARAM: Status = Status(5);
    /// A value was saturated.
    pub const WRN_VALUE_NOT_CHANGED: Status = Status(6);

    /// Whether this status is an error.
    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 < 0
    }

    /// Whether this status is a warning.
    #[inline]
    pub const fn is_warning(self) -> bool {
        self.0 > 0
    }

    /// Whether this status is plain success.
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Split into `Ok` (success or warning) and `Err` (error).
    #[inline]
    pub fn into_result(self) -> Result<Status> {
        if self.is_error() {
            Err(Error::from_status(self))
        } else {
            Ok(self)
        }
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NONE => "NONE",
            Self::ERR_UNKNOWN => "ERR_UNKNOWN",
            Self::ERR_NULL_PTR => "ERR_NULL_PTR",
            Self::ERR_UNSUPPORTED => "ERR_UNSUPPORTED",
            Self::ERR_MEMORY_ALLOC => "ERR_MEMORY_ALLOC",
            Self::ERR_NOT_ENOUGH_BUFFER => "ERR_NOT_ENOUGH_BUFFER",
            Self::ERR_INVALID_HANDLE => "ERR_INVALID_HANDLE",
            Self::ERR_LOCK_MEMORY => "ERR_LOCK_MEMORY",
            Self::ERR_NOT_INITIALIZED => "ERR_NOT_INITIALIZED",
            Self::ERR_NOT_FOUND => "ERR_NOT_FOUND",
            Self::ERR_MORE_DATA => "ERR_MORE_DATA",
            Self::ERR_MORE_SURFACE => "ERR_MORE_SURFACE",
            Self::ERR_ABORTED => "ERR_ABORTED",
            Self::ERR_DEVICE_LOST => "ERR_DEVICE_LOST",
            Self::ERR_INCOMPATIBLE_VIDEO_PARAM => "ERR_INCOMPATIBLE_VIDEO_PARAM",
            Self::ERR_INVALID_VIDEO_PARAM => "ERR_INVALID_VIDEO_PARAM",
            Self::ERR_UNDEFINED_BEHAVIOR => "ERR_UNDEFINED_BEHAVIOR",
            Self::ERR_DEVICE_FAILED => "ERR_DEVICE_FAILED",
            Self::ERR_NOT_IMPLEMENTED => "ERR_NOT_IMPLEMENTED",
            Self::WRN_IN_EXECUTION => "WRN_IN_EXECUTION",
            Self::WRN_DEVICE_BUSY => "WRN_DEVICE_BUSY",
            Self::WRN_VIDEO_PARAM_CHANGED => "WRN_VIDEO_PARAM_CHANGED",
            Self::WRN_PARTIAL_ACCELERATION => "WRN_PARTIAL_ACCELERATION",
            Self::WRN_INCOMPATIBLE_VIDEO_PARAM => "WRN_INCOMPATIBLE_VIDEO_PARAM",
            Self::WRN_VALUE_NOT_CHANGED => "WRN_VALUE_NOT_CHANGED",
            _ => return None,
        })
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Status::NONE.is_ok());
        assert!(Status::ERR_MORE_DATA.is_error());
        assert!(Status::WRN_IN_EXECUTION.is_warning());
        assert!(!Status::WRN_IN_EXECUTION.is_error());
    }

    #[test]
    fn test_into_result_keeps_warnings() {
        assert_eq!(
            Status::WRN_DEVICE_BUSY.into_result(),
            Ok(Status::WRN_DEVICE_BUSY)
        );
        assert_eq!(Status::ERR_MORE_DATA.into_result(), Err(Error::MoreData));
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::ERR_NULL_PTR.to_string(), "ERR_NULL_PTR (-2)");
        assert_eq!(Status(-1234).to_string(), "status -1234");
    }
}
