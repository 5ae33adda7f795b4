//! Errors raised by the frame cache.

use crate::target::{RegNum, TargetError};
use thiserror::Error;

/// Result type for frame cache operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Frame cache errors.
///
/// A policy stop at `main` is not an error; it is reported as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    // ── Unavailable context ───────────────────────────────────────────────────
    #[error("No registers.")]
    NoRegisters,

    #[error("No stack.")]
    NoStack,

    #[error("No memory.")]
    NoMemory,

    // ── Corruption ────────────────────────────────────────────────────────────
    #[error("Previous frame inner to this frame (corrupt stack?)")]
    PreviousInnerThanThis { level: i64 },

    #[error("Previous frame identical to this frame (corrupt stack?)")]
    PreviousIdenticalToThis { level: i64 },

    // ── Policy ────────────────────────────────────────────────────────────────
    #[error("Backtrace limit of {limit} exceeded")]
    BacktraceLimitExceeded { limit: u32 },

    // ── Register and memory access ────────────────────────────────────────────
    #[error("Attempt to assign to a value that was optimized out.")]
    OptimizedOut,

    #[error("Attempt to assign to an unmodifiable value.")]
    Unmodifiable,

    #[error("Invalid register #{0}")]
    UnknownRegister(RegNum),

    #[error("Register #{regnum} is {expected} bytes, got {actual}")]
    RegisterSizeMismatch {
        regnum: RegNum,
        expected: usize,
        actual: usize,
    },

    #[error("Register #{0} is not available")]
    RegisterUnavailable(RegNum),

    // ── Chain ─────────────────────────────────────────────────────────────────
    #[error("Only one stack frame; can't pop it")]
    NoPreviousFrame,

    #[error("No unwinder accepts the frame at level {level}")]
    NoUnwinder { level: i64 },

    #[error("Frame reference is stale; the frame cache was flushed")]
    StaleFrame,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Target(#[from] TargetError),
}

impl FrameError {
    /// True for the corruption errors: the chain cannot be trusted beyond
    /// the frame that raised them.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FrameError::PreviousInnerThanThis { .. } | FrameError::PreviousIdenticalToThis { .. }
        )
    }

    /// True when the target lacks registers, stack or memory.
    pub fn is_unavailable_context(&self) -> bool {
        matches!(
            self,
            FrameError::NoRegisters | FrameError::NoStack | FrameError::NoMemory
        )
    }
}
