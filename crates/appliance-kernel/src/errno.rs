//! Guest-facing system-call status codes.
//!
//! Every system call reports failure through a [`KErrno`] value rather than
//! a host-side error type, keeping guest-visible behavior indistinguishable
//! from a real syscall ABI.

use thiserror::Error;

/// Status code returned to guest code by every system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u32)]
pub enum KErrno {
    /// Operation completed.
    #[error("ok")]
    Ok = 0,
    /// Operation exists but is not implemented.
    #[error("not implemented")]
    NotImplemented = 1,
    /// Named object does not exist.
    #[error("not found")]
    NotFound = 2,
    /// Named object already exists.
    #[error("already exists")]
    AlreadyExists = 3,
    /// Handle is not open in the calling process.
    #[error("invalid handle")]
    InvalidHandle = 4,
    /// A parameter violated the call's contract.
    #[error("invalid parameter")]
    InvalidParameter = 5,
    /// A bounded resource (message backlog) is exhausted.
    #[error("limit reached")]
    LimitReached = 6,
    /// A bounded wait expired before the condition held.
    #[error("timed out")]
    TimedOut = 7,
    /// The calling native thread has a pending termination request; the
    /// call unwound without completing.
    #[error("cancelled")]
    Cancelled = 8,
}

impl KErrno {
    /// Stable ABI value of this status code.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decodes a stable ABI value.
    #[must_use]
    pub const fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::NotImplemented),
            2 => Some(Self::NotFound),
            3 => Some(Self::AlreadyExists),
            4 => Some(Self::InvalidHandle),
            5 => Some(Self::InvalidParameter),
            6 => Some(Self::LimitReached),
            7 => Some(Self::TimedOut),
            8 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Result alias used by every system call.
pub type KResult<T> = Result<T, KErrno>;
