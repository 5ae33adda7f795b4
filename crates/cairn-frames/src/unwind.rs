//! Unwinder strategies.
//!
//! An [`Unwinder`] knows how to describe one kind of frame: its identity and
//! where each of its registers was saved. It always works from the frame's
//! inner neighbour (`next`), because that is the only frame whose registers
//! are already known when the outer one is being built.

use crate::cache::FrameCache;
use crate::error::FrameResult;
use crate::frame::{FrameKind, FrameRef, PrologueCache};
use crate::id::FrameId;
use crate::target::{Addr, RegNum};
use std::fmt;
use std::rc::Rc;

// ── RegisterValue ────────────────────────────────────────────────────────────

/// Where a register's value in some frame lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLocation {
    /// Saved in target memory.
    Memory(Addr),
    /// Still held in a live register (not necessarily the same number).
    Register(RegNum),
    /// Computed by the unwinder; there is nothing to write back to.
    NotLval,
}

/// The value of a register as seen from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValue {
    pub optimized_out: bool,
    pub location: RegisterLocation,
    /// Raw contents, `None` when optimized out.
    pub bytes: Option<Vec<u8>>,
}

impl RegisterValue {
    pub fn in_register(regnum: RegNum, bytes: Vec<u8>) -> Self {
        Self {
            optimized_out: false,
            location: RegisterLocation::Register(regnum),
            bytes: Some(bytes),
        }
    }

    pub fn in_memory(addr: Addr, bytes: Vec<u8>) -> Self {
        Self {
            optimized_out: false,
            location: RegisterLocation::Memory(addr),
            bytes: Some(bytes),
        }
    }

    pub fn computed(bytes: Vec<u8>) -> Self {
        Self {
            optimized_out: false,
            location: RegisterLocation::NotLval,
            bytes: Some(bytes),
        }
    }

    pub fn optimized_out() -> Self {
        Self {
            optimized_out: true,
            location: RegisterLocation::NotLval,
            bytes: None,
        }
    }
}

// ── Unwinder ─────────────────────────────────────────────────────────────────

/// A frame unwinding strategy.
///
/// `next` is the inner neighbour of the frame being described and `cache`
/// is the described frame's own scratch slot, shared across all calls for
/// that frame. The slot is lent to one call at a time: a method that asks
/// the cache about the described frame itself gets a fresh, empty slot for
/// the nested call.
pub trait Unwinder {
    fn name(&self) -> &str;

    /// Kind of every frame this unwinder claims.
    fn kind(&self) -> FrameKind;

    /// Does this unwinder claim the frame outer to `next`?
    fn sniff(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<bool>;

    /// Identity of the frame outer to `next`. [`FrameId::NULL`] means the
    /// frame cannot be identified and the chain ends there.
    fn this_id(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<FrameId>;

    /// Value of register `regnum` in the frame *outer* to the one claimed,
    /// as unwound from it.
    fn prev_register(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
        regnum: RegNum,
    ) -> FrameResult<RegisterValue>;
}

impl fmt::Debug for dyn Unwinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unwinder({}, {})", self.name(), self.kind())
    }
}

/// True if `a` and `b` are the same strategy object.
pub(crate) fn same_unwinder(a: &Rc<dyn Unwinder>, b: &Rc<dyn Unwinder>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}

// ── UnwinderRegistry ─────────────────────────────────────────────────────────

/// Ordered list of unwinders; the first whose `sniff` accepts a frame wins.
#[derive(Clone, Default)]
pub struct UnwinderRegistry {
    unwinders: Vec<Rc<dyn Unwinder>>,
}

impl UnwinderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unwinder with the lowest priority.
    pub fn append(&mut self, unwinder: Rc<dyn Unwinder>) {
        self.unwinders.push(unwinder);
    }

    /// Add an unwinder with the highest priority.
    pub fn prepend(&mut self, unwinder: Rc<dyn Unwinder>) {
        self.unwinders.insert(0, unwinder);
    }

    pub fn len(&self) -> usize {
        self.unwinders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unwinders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Unwinder>> {
        self.unwinders.iter()
    }
}

impl FromIterator<Rc<dyn Unwinder>> for UnwinderRegistry {
    fn from_iter<I: IntoIterator<Item = Rc<dyn Unwinder>>>(iter: I) -> Self {
        Self {
            unwinders: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for UnwinderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.unwinders.iter().map(|u| u.name()))
            .finish()
    }
}

// ── SentinelUnwinder ─────────────────────────────────────────────────────────

/// Unwinder of the sentinel frame: the "previous" registers of the sentinel
/// are the live registers of the target, which makes them the registers of
/// the innermost real frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelUnwinder;

impl Unwinder for SentinelUnwinder {
    fn name(&self) -> &str {
        "sentinel"
    }

    fn kind(&self) -> FrameKind {
        FrameKind::Sentinel
    }

    fn sniff(&self, _: &mut FrameCache, _: FrameRef, _: &mut PrologueCache) -> FrameResult<bool> {
        Ok(false)
    }

    fn this_id(
        &self,
        _: &mut FrameCache,
        _: FrameRef,
        _: &mut PrologueCache,
    ) -> FrameResult<FrameId> {
        Ok(FrameId::NULL)
    }

    fn prev_register(
        &self,
        frames: &mut FrameCache,
        _: FrameRef,
        _: &mut PrologueCache,
        regnum: RegNum,
    ) -> FrameResult<RegisterValue> {
        let bytes = frames.target().read_register(regnum)?;
        Ok(RegisterValue::in_register(regnum, bytes))
    }
}
