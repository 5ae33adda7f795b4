//! Frame nodes and the arena that owns them.
//!
//! Every frame built for one stop of the target lives in a single
//! [`FrameArena`]. Frames are only ever appended (inner to outer) and are
//! freed all at once by a flush, so neighbour links are plain indices. A
//! [`FrameRef`] also carries the arena generation it was issued in; using
//! it after a flush yields [`FrameError::StaleFrame`] instead of reaching
//! a frame from a different stop.

use crate::base::FrameBase;
use crate::error::{FrameError, FrameResult};
use crate::id::FrameId;
use crate::target::Addr;
use crate::unwind::Unwinder;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

/// Level of the sentinel frame.
pub const SENTINEL_LEVEL: i64 = -1;

// ── FrameKind ────────────────────────────────────────────────────────────────

/// Classification of a frame, supplied by the unwinder that claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// An ordinary function activation.
    Normal,
    /// A synthetic frame pushed by the debugger itself (e.g. for an
    /// inferior function call).
    Dummy,
    /// The runtime's signal-delivery shim.
    SignalTrampoline,
    /// The boundary frame backed by the live register set.
    Sentinel,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Normal => "NORMAL_FRAME",
            FrameKind::Dummy => "DUMMY_FRAME",
            FrameKind::SignalTrampoline => "SIGTRAMP_FRAME",
            FrameKind::Sentinel => "SENTINEL_FRAME",
        };
        f.write_str(name)
    }
}

// ── FrameRef ─────────────────────────────────────────────────────────────────

/// Handle to a frame in a [`FrameCache`](crate::FrameCache).
///
/// Handles are cheap to copy and compare: two handles are equal exactly
/// when they name the same cached frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef {
    index: u32,
    generation: u32,
}

impl FrameRef {
    /// The arena generation this handle was issued in.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }
}

// ── PrologueCache ────────────────────────────────────────────────────────────

/// Per-frame scratch space owned by whichever unwinder or frame-base
/// provider claimed the frame.
///
/// The frame cache never looks inside; it only hands the same slot back on
/// every call for the same frame, and drops it on flush.
#[derive(Default)]
pub struct PrologueCache(Option<Box<dyn Any>>);

impl PrologueCache {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.0.as_mut().and_then(|value| value.downcast_mut::<T>())
    }

    /// Store `value`, replacing whatever was cached.
    pub fn insert<T: 'static>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    /// Return the cached `T`, computing and storing it first if the slot is
    /// empty. A slot already holding some other type is an internal error.
    pub fn get_or_try_insert_with<T: 'static>(
        &mut self,
        init: impl FnOnce() -> FrameResult<T>,
    ) -> FrameResult<&mut T> {
        if self.0.is_none() {
            self.insert(init()?);
        }
        self.get_mut::<T>().ok_or_else(|| {
            FrameError::Internal(format!(
                "prologue cache holds a value other than {}",
                type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for PrologueCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrologueCache")
            .field(&if self.is_empty() { "empty" } else { "filled" })
            .finish()
    }
}

// ── FrameNode ────────────────────────────────────────────────────────────────

/// Outward-growth state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PrevLink {
    #[default]
    Unattempted,
    Attempted(Option<FrameRef>),
}

/// One cached activation.
///
/// Memoized fields are `None` until first computed and never change
/// afterwards. `prev_pc` and `prev_func` describe the frame *outer* to this
/// one, computed from here.
pub(crate) struct FrameNode {
    pub level: i64,
    pub next: FrameRef,
    pub prev: PrevLink,
    pub this_id: Option<FrameId>,
    pub prev_pc: Option<Addr>,
    pub prev_func: Option<Option<Addr>>,
    pub unwind: Option<Rc<dyn Unwinder>>,
    pub base: Option<Rc<dyn FrameBase>>,
    pub prologue_cache: PrologueCache,
    pub base_cache: PrologueCache,
}

impl FrameNode {
    pub fn new(level: i64, next: FrameRef) -> Self {
        Self {
            level,
            next,
            prev: PrevLink::Unattempted,
            this_id: None,
            prev_pc: None,
            prev_func: None,
            unwind: None,
            base: None,
            prologue_cache: PrologueCache::new(),
            base_cache: PrologueCache::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.level == SENTINEL_LEVEL
    }
}

// ── FrameArena ───────────────────────────────────────────────────────────────

/// Append-only storage for the frames of one stop.
#[derive(Default)]
pub(crate) struct FrameArena {
    nodes: Vec<FrameNode>,
    generation: u32,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node. `build` receives the handle the node will have, so
    /// a node may refer to itself.
    pub fn alloc_with(&mut self, build: impl FnOnce(FrameRef) -> FrameNode) -> FrameRef {
        let frame = FrameRef {
            index: self.nodes.len() as u32,
            generation: self.generation,
        };
        self.nodes.push(build(frame));
        frame
    }

    pub fn get(&self, frame: FrameRef) -> FrameResult<&FrameNode> {
        if frame.generation != self.generation {
            return Err(FrameError::StaleFrame);
        }
        self.nodes.get(frame.index()).ok_or(FrameError::StaleFrame)
    }

    pub fn get_mut(&mut self, frame: FrameRef) -> FrameResult<&mut FrameNode> {
        if frame.generation != self.generation {
            return Err(FrameError::StaleFrame);
        }
        self.nodes
            .get_mut(frame.index())
            .ok_or(FrameError::StaleFrame)
    }

    pub fn contains(&self, frame: FrameRef) -> bool {
        self.get(frame).is_ok()
    }

    /// Free every node and invalidate every handle issued so far.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
