//! The frame cache and the chain-growth algorithm.
//!
//! Frames are built on demand, innermost first. Asking for the current
//! frame creates the sentinel and unwinds exactly one step from it; asking
//! for the frame previous to some frame unwinds exactly one more step, and
//! remembers the answer (including "there is none") until the next flush.

use crate::arch::Arch;
use crate::base::FrameBaseRegistry;
use crate::error::{FrameError, FrameResult};
use crate::frame::{FrameArena, FrameKind, FrameNode, FrameRef, PrevLink, PrologueCache, SENTINEL_LEVEL};
use crate::id::FrameId;
use crate::session::LanguageState;
use crate::symbols::{NoSymbols, Symbols};
use crate::target::{Addr, Target};
use crate::unwind::{SentinelUnwinder, Unwinder, UnwinderRegistry};
use cairn_config::{BacktraceSettings, DebuggerConfig, LanguageMode};
use std::fmt;
use std::mem;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Which of a frame's two scratch slots an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheSlot {
    Prologue,
    Base,
}

// ── FrameCache ───────────────────────────────────────────────────────────────

/// All frames of one stop of the target, plus the session state around
/// them (selected frame, backtrace policy, language).
///
/// The cache must be [flushed](FrameCache::flush) whenever the target
/// resumes or its registers may have changed; it cannot detect that on its
/// own.
pub struct FrameCache {
    pub(crate) arena: FrameArena,
    pub(crate) current: Option<FrameRef>,
    pub(crate) selected: Option<FrameRef>,
    pub(crate) settings: BacktraceSettings,
    pub(crate) language: LanguageState,
    pub(crate) target: Box<dyn Target>,
    pub(crate) arch: Rc<dyn Arch>,
    pub(crate) symbols: Rc<dyn Symbols>,
    pub(crate) unwinders: UnwinderRegistry,
    pub(crate) bases: FrameBaseRegistry,
    sentinel_unwinder: Rc<dyn Unwinder>,
}

impl FrameCache {
    /// Create an empty cache over `target`.
    ///
    /// No unwinders are registered; without any, only the sentinel frame
    /// can be built.
    pub fn new(target: Box<dyn Target>, arch: Rc<dyn Arch>) -> Self {
        Self {
            arena: FrameArena::new(),
            current: None,
            selected: None,
            settings: BacktraceSettings::default(),
            language: LanguageState::default(),
            target,
            arch,
            symbols: Rc::new(NoSymbols),
            unwinders: UnwinderRegistry::new(),
            bases: FrameBaseRegistry::new(),
            sentinel_unwinder: Rc::new(SentinelUnwinder),
        }
    }

    pub fn with_symbols(mut self, symbols: Rc<dyn Symbols>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_unwinders(mut self, unwinders: UnwinderRegistry) -> Self {
        self.unwinders = unwinders;
        self
    }

    pub fn with_frame_bases(mut self, bases: FrameBaseRegistry) -> Self {
        self.bases = bases;
        self
    }

    pub fn with_settings(mut self, settings: BacktraceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_language_mode(mut self, mode: LanguageMode) -> Self {
        self.language.set_mode(mode);
        self
    }

    /// Apply a loaded configuration file.
    pub fn with_config(self, config: &DebuggerConfig) -> Self {
        self.with_settings(config.backtrace_settings())
            .with_language_mode(config.language_mode())
    }

    pub fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }

    pub fn arch(&self) -> &dyn Arch {
        self.arch.as_ref()
    }

    pub fn symbols(&self) -> &dyn Symbols {
        self.symbols.as_ref()
    }

    /// Number of frames (sentinels included) currently cached.
    pub fn cached_frames(&self) -> usize {
        self.arena.len()
    }

    // ── Chain growth ─────────────────────────────────────────────────────────

    /// The innermost real frame.
    ///
    /// Fails if the target has no registers, stack or memory. If the very
    /// first unwind step fails, the sentinel frame itself is returned.
    pub fn current_frame(&mut self) -> FrameResult<FrameRef> {
        self.check_target_state()?;
        if let Some(current) = self.current {
            return Ok(current);
        }

        let sentinel = self.create_sentinel_frame();
        let current = match self.grow_outward(sentinel) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("no frame outer to the sentinel; using the sentinel as current frame");
                sentinel
            }
            Err(error) => {
                warn!(%error, "unwinding the current frame failed; using the sentinel");
                sentinel
            }
        };
        self.current = Some(current);
        let level = self.arena.get(current)?.level;
        debug!(level, "current frame established");
        Ok(current)
    }

    pub(crate) fn check_target_state(&self) -> FrameResult<()> {
        if !self.target.has_registers() {
            return Err(FrameError::NoRegisters);
        }
        if !self.target.has_stack() {
            return Err(FrameError::NoStack);
        }
        if !self.target.has_memory() {
            return Err(FrameError::NoMemory);
        }
        Ok(())
    }

    fn create_sentinel_frame(&mut self) -> FrameRef {
        let unwinder = Rc::clone(&self.sentinel_unwinder);
        self.arena.alloc_with(|me| {
            let mut node = FrameNode::new(SENTINEL_LEVEL, me);
            node.unwind = Some(unwinder);
            node.this_id = Some(FrameId::NULL);
            node
        })
    }

    /// The frame that called `this`, subject to backtrace policy.
    ///
    /// `None` for `this` returns the cached current frame, if any. Stopping
    /// at `main` is checked before the unwind attempt is recorded, so
    /// relaxing the policy later lets the chain grow past `main`.
    pub fn previous_frame(&mut self, this: Option<FrameRef>) -> FrameResult<Option<FrameRef>> {
        let Some(this) = this else {
            debug!("previous frame of no frame requested; returning current frame");
            return Ok(self.current);
        };
        let level = self.arena.get(this)?.level;

        if level >= 0 && self.settings.stop_at_main() && self.inside_main_func(this)? {
            debug!(level, "frame is inside main; stopping backtrace");
            return Ok(None);
        }

        if let Some(limit) = self.settings.limit {
            if level >= i64::from(limit) {
                return Err(FrameError::BacktraceLimitExceeded { limit });
            }
        }

        self.grow_outward(this)
    }

    /// Unwind one step from `this` without applying any stop policy.
    pub(crate) fn grow_outward(&mut self, this: FrameRef) -> FrameResult<Option<FrameRef>> {
        let node = self.arena.get_mut(this)?;
        if let PrevLink::Attempted(prev) = node.prev {
            return Ok(prev);
        }
        // Recorded first so that anything below unwinding through this
        // frame again sees "no previous frame" instead of recursing.
        node.prev = PrevLink::Attempted(None);
        let level = node.level;
        let next = node.next;

        let this_id = self.frame_id(this)?;
        if level >= 0 && !this_id.is_valid() {
            debug!(level, "frame has no identity; end of chain");
            return Ok(None);
        }

        let next_level = self.arena.get(next)?.level;
        if next_level >= 0 && self.frame_kind(next)? != FrameKind::SignalTrampoline {
            let next_id = self.frame_id(next)?;
            if this_id.is_inner_than(&next_id, self.arch.stack_direction()) {
                debug!(level, id = %this_id, next_id = %next_id, "frame is inner to its callee");
                return Err(FrameError::PreviousInnerThanThis { level });
            }
        }

        if level > 0 {
            let next_id = self.frame_id(next)?;
            if this_id.matches(&next_id) {
                debug!(level, id = %this_id, "frame is identical to its callee");
                return Err(FrameError::PreviousIdenticalToThis { level });
            }
        }

        let prev = self
            .arena
            .alloc_with(|_| FrameNode::new(level + 1, this));
        self.arena.get_mut(this)?.prev = PrevLink::Attempted(Some(prev));
        debug!(level = level + 1, "frame created");
        Ok(Some(prev))
    }

    /// Is `frame`'s function the program's `main`?
    fn inside_main_func(&mut self, frame: FrameRef) -> FrameResult<bool> {
        let Some(main) = self.symbols.main_address() else {
            return Ok(false);
        };
        let main = self.arch.convert_from_func_ptr_addr(main);
        Ok(self.frame_func(frame)? == Some(main))
    }

    /// Locate a frame by identity, walking outward from the current frame.
    ///
    /// Gives up as soon as the walk passes the place on the stack where
    /// `id` would have been.
    pub fn find_by_id(&mut self, id: &FrameId) -> FrameResult<Option<FrameRef>> {
        if !id.is_valid() {
            return Ok(None);
        }
        let direction = self.arch.stack_direction();
        let mut frame = Some(self.current_frame()?);
        while let Some(this) = frame {
            let this_id = self.frame_id(this)?;
            if id.matches(&this_id) {
                return Ok(Some(this));
            }
            if id.is_inner_than(&this_id, direction) {
                return Ok(None);
            }
            frame = self.previous_frame(Some(this))?;
        }
        Ok(None)
    }

    /// Make a level-0 frame for an arbitrary stack address and PC.
    ///
    /// The frame hangs off its own fresh sentinel and does not become the
    /// current frame.
    pub fn create_new_frame(&mut self, stack_addr: Addr, pc: Addr) -> FrameResult<FrameRef> {
        let sentinel = self.create_sentinel_frame();
        let frame = self.arena.alloc_with(|_| {
            let mut node = FrameNode::new(0, sentinel);
            node.this_id = Some(FrameId::build_wild(stack_addr));
            node
        });
        let sentinel_node = self.arena.get_mut(sentinel)?;
        sentinel_node.prev = PrevLink::Attempted(Some(frame));
        sentinel_node.prev_pc = Some(pc);

        self.frame_unwinder(frame)?;
        debug!(stack_addr, pc, "created frame for user-specified address");
        Ok(frame)
    }

    // ── Per-frame identity and classification ────────────────────────────────

    /// Identity of `frame`, computed once.
    pub fn frame_id(&mut self, frame: FrameRef) -> FrameResult<FrameId> {
        let node = self.arena.get(frame)?;
        if let Some(id) = node.this_id {
            return Ok(id);
        }
        let level = node.level;
        let id = self.with_unwinder(frame, |unwinder, frames, next, cache| {
            unwinder.this_id(frames, next, cache)
        })?;
        self.arena.get_mut(frame)?.this_id = Some(id);
        trace!(level, id = %id, "frame id computed");
        Ok(id)
    }

    /// Identity of the frame outer to `next`, or the null identity.
    pub fn unwind_id(&mut self, next: FrameRef) -> FrameResult<FrameId> {
        match self.grow_outward(next)? {
            Some(prev) => self.frame_id(prev),
            None => Ok(FrameId::NULL),
        }
    }

    pub fn level(&self, frame: FrameRef) -> FrameResult<i64> {
        Ok(self.arena.get(frame)?.level)
    }

    /// The frame `frame` calls; `None` for the innermost real frame.
    pub fn next_frame(&self, frame: FrameRef) -> FrameResult<Option<FrameRef>> {
        let node = self.arena.get(frame)?;
        Ok((node.level > 0).then_some(node.next))
    }

    pub fn frame_kind(&mut self, frame: FrameRef) -> FrameResult<FrameKind> {
        Ok(self.frame_unwinder(frame)?.kind())
    }

    /// The unwinder that claimed `frame`, resolved on first use.
    pub fn frame_unwinder(&mut self, frame: FrameRef) -> FrameResult<Rc<dyn Unwinder>> {
        let node = self.arena.get(frame)?;
        if let Some(unwinder) = &node.unwind {
            return Ok(Rc::clone(unwinder));
        }
        let level = node.level;
        let next = node.next;

        let candidates: Vec<Rc<dyn Unwinder>> = self.unwinders.iter().cloned().collect();
        let unwinder = self.with_cache(frame, CacheSlot::Prologue, |frames, cache| {
            for candidate in candidates {
                if candidate.sniff(frames, next, cache)? {
                    return Ok(candidate);
                }
            }
            Err(FrameError::NoUnwinder { level })
        })?;

        trace!(level, unwinder = unwinder.name(), "unwinder resolved");
        self.arena.get_mut(frame)?.unwind = Some(Rc::clone(&unwinder));
        Ok(unwinder)
    }

    // ── Scratch slot plumbing ────────────────────────────────────────────────

    /// Run `f` with one of `frame`'s scratch slots lent out.
    ///
    /// The slot is moved out of the arena for the duration of the call, so
    /// `f` is free to use the cache mutably. A nested call for the same frame
    /// and slot sees it empty; whatever that nested call stored is kept when
    /// `f` itself left its copy empty.
    pub(crate) fn with_cache<R>(
        &mut self,
        frame: FrameRef,
        slot: CacheSlot,
        f: impl FnOnce(&mut Self, &mut PrologueCache) -> FrameResult<R>,
    ) -> FrameResult<R> {
        let node = self.arena.get_mut(frame)?;
        let mut cache = mem::take(Self::slot_mut(node, slot));
        let result = f(self, &mut cache);
        if let Ok(node) = self.arena.get_mut(frame) {
            let stored = Self::slot_mut(node, slot);
            if !cache.is_empty() || stored.is_empty() {
                *stored = cache;
            } else {
                trace!(?slot, "keeping scratch slot filled by a nested call");
            }
        }
        result
    }

    fn slot_mut(node: &mut FrameNode, slot: CacheSlot) -> &mut PrologueCache {
        match slot {
            CacheSlot::Prologue => &mut node.prologue_cache,
            CacheSlot::Base => &mut node.base_cache,
        }
    }

    /// Run `f` with `frame`'s unwinder, inner neighbour and prologue cache.
    pub(crate) fn with_unwinder<R>(
        &mut self,
        frame: FrameRef,
        f: impl FnOnce(&dyn Unwinder, &mut Self, FrameRef, &mut PrologueCache) -> FrameResult<R>,
    ) -> FrameResult<R> {
        let unwinder = self.frame_unwinder(frame)?;
        let next = self.arena.get(frame)?.next;
        self.with_cache(frame, CacheSlot::Prologue, |frames, cache| {
            f(unwinder.as_ref(), frames, next, cache)
        })
    }
}

impl fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCache")
            .field("arch", &self.arch.name())
            .field("frames", &self.arena.len())
            .field("generation", &self.arena.generation())
            .field("current", &self.current)
            .field("selected", &self.selected)
            .field("settings", &self.settings)
            .field("unwinders", &self.unwinders)
            .finish_non_exhaustive()
    }
}
