//! Frame identity.
//!
//! A [`FrameId`] names one activation on the call stack well enough to find
//! it again after the cache has been flushed and rebuilt. The stack address
//! says *which* activation, the code address says *which function*, and the
//! special address breaks ties between activations sharing both.
//!
//! Comparison is deliberately not [`PartialEq`]: an absent code or special
//! address matches anything, so [`FrameId::matches`] is not transitive, and
//! the null identity matches nothing, not even itself.

use crate::arch::StackDirection;
use crate::target::Addr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a frame on the call stack.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrameId {
    stack_addr: Option<Addr>,
    code_addr: Option<Addr>,
    special_addr: Option<Addr>,
}

impl FrameId {
    /// The null identity. Matches nothing and is inner than nothing.
    pub const NULL: FrameId = FrameId {
        stack_addr: None,
        code_addr: None,
        special_addr: None,
    };

    /// Build an identity from individually known parts.
    pub fn new(stack_addr: Addr, code_addr: Option<Addr>, special_addr: Option<Addr>) -> Self {
        Self {
            stack_addr: Some(stack_addr),
            code_addr,
            special_addr,
        }
    }

    /// Identity of an activation of the function at `code_addr`.
    pub fn build(stack_addr: Addr, code_addr: Addr) -> Self {
        Self::new(stack_addr, Some(code_addr), None)
    }

    /// Like [`FrameId::build`], with a tie-breaking special address.
    pub fn build_special(stack_addr: Addr, code_addr: Addr, special_addr: Addr) -> Self {
        Self::new(stack_addr, Some(code_addr), Some(special_addr))
    }

    /// Identity where only the stack anchor is known.
    pub fn build_wild(stack_addr: Addr) -> Self {
        Self::new(stack_addr, None, None)
    }

    /// True unless this is the null identity.
    pub fn is_valid(&self) -> bool {
        self.stack_addr.is_some()
    }

    pub fn stack_addr(&self) -> Option<Addr> {
        self.stack_addr
    }

    pub fn code_addr(&self) -> Option<Addr> {
        self.code_addr
    }

    pub fn special_addr(&self) -> Option<Addr> {
        self.special_addr
    }

    /// Wildcard equality.
    ///
    /// False if either side is null or the stack addresses differ. A code
    /// address missing on either side matches anything, special addresses
    /// included; otherwise a special address missing on either side matches.
    pub fn matches(&self, other: &FrameId) -> bool {
        let (Some(l), Some(r)) = (self.stack_addr, other.stack_addr) else {
            return false;
        };
        if l != r {
            return false;
        }
        let (Some(l), Some(r)) = (self.code_addr, other.code_addr) else {
            return true;
        };
        if l != r {
            return false;
        }
        if let (Some(l), Some(r)) = (self.special_addr, other.special_addr) {
            if l != r {
                return false;
            }
        }
        true
    }

    /// True if this frame is deeper on the stack than `other`.
    ///
    /// Only the stack addresses take part; false if either side is null.
    pub fn is_inner_than(&self, other: &FrameId, direction: StackDirection) -> bool {
        match (self.stack_addr, other.stack_addr) {
            (Some(l), Some(r)) => direction.inner_than(l, r),
            _ => false,
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(f: &mut fmt::Formatter<'_>, name: &str, value: Option<Addr>) -> fmt::Result {
            match value {
                Some(addr) => write!(f, "{name}={addr:#x}"),
                None => write!(f, "!{name}"),
            }
        }
        f.write_str("{")?;
        field(f, "stack", self.stack_addr)?;
        f.write_str(",")?;
        field(f, "code", self.code_addr)?;
        f.write_str(",")?;
        field(f, "special", self.special_addr)?;
        f.write_str("}")
    }
}
