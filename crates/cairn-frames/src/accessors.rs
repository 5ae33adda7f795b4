//! Memoized per-frame queries: resume address, function, source line and
//! frame-base addresses.
//!
//! Everything here is computed from a frame's inner neighbour. The `*_unwind`
//! forms take that neighbour directly; the `frame_*` forms take the frame
//! itself.

use crate::base::FrameBase;
use crate::cache::{CacheSlot, FrameCache};
use crate::error::{FrameError, FrameResult};
use crate::frame::{FrameKind, FrameRef};
use crate::symbols::SourceLine;
use crate::target::Addr;
use crate::unwind::same_unwinder;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
enum BaseQuery {
    Base,
    Locals,
    Args,
}

impl FrameCache {
    // ── Program counter ──────────────────────────────────────────────────────

    /// Resume address of the frame outer to `next`.
    ///
    /// Uses the architecture's PC unwinder when there is one. Otherwise only
    /// the sentinel can answer, by reading the live PC.
    pub fn pc_unwind(&mut self, next: FrameRef) -> FrameResult<Addr> {
        let node = self.arena.get(next)?;
        if let Some(pc) = node.prev_pc {
            return Ok(pc);
        }
        let level = node.level;
        let is_sentinel = node.is_sentinel();

        let arch = Rc::clone(&self.arch);
        let pc = match arch.unwind_pc(self, next)? {
            Some(pc) => pc,
            None if is_sentinel => self.read_pc()?,
            None => {
                return Err(FrameError::Internal(format!(
                    "{} has no unwind_pc method",
                    arch.name()
                )))
            }
        };

        self.arena.get_mut(next)?.prev_pc = Some(pc);
        trace!(next_level = level, pc, "resume pc computed");
        Ok(pc)
    }

    fn read_pc(&self) -> FrameResult<Addr> {
        let bytes = self.target.read_register(self.arch.pc_regnum())?;
        Ok(self.arch.byte_order().extract_unsigned(&bytes))
    }

    /// Resume address of `frame`.
    pub fn frame_pc(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        let next = self.arena.get(frame)?.next;
        self.pc_unwind(next)
    }

    /// An address inside the code block of the frame outer to `next`.
    ///
    /// A caller's resume address points after its call instruction, which
    /// may already be outside the calling function, so for frames called by
    /// a normal frame it is moved back by one.
    pub fn unwind_address_in_block(&mut self, next: FrameRef) -> FrameResult<Addr> {
        let pc = self.pc_unwind(next)?;
        let next_level = self.arena.get(next)?.level;
        if next_level >= 0 && self.frame_kind(next)? == FrameKind::Normal {
            return Ok(pc.wrapping_sub(1));
        }
        Ok(pc)
    }

    pub fn address_in_block(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        let next = self.arena.get(frame)?.next;
        self.unwind_address_in_block(next)
    }

    // ── Function ─────────────────────────────────────────────────────────────

    /// Start of the function owning the frame outer to `next`.
    pub fn func_unwind(&mut self, next: FrameRef) -> FrameResult<Option<Addr>> {
        let node = self.arena.get(next)?;
        if let Some(func) = node.prev_func {
            return Ok(func);
        }
        let level = node.level;

        let block = self.unwind_address_in_block(next)?;
        let func = self.symbols.function_start(block);
        self.arena.get_mut(next)?.prev_func = Some(func);
        trace!(next_level = level, block, func = ?func, "function start computed");
        Ok(func)
    }

    /// Start of the function `frame` is executing.
    pub fn frame_func(&mut self, frame: FrameRef) -> FrameResult<Option<Addr>> {
        let next = self.arena.get(frame)?.next;
        self.func_unwind(next)
    }

    /// Source line `frame` is at.
    ///
    /// For an outer frame called by a normal frame this is the line of the
    /// call, not whatever follows it.
    pub fn find_frame_line(&mut self, frame: FrameRef) -> FrameResult<Option<SourceLine>> {
        let pc = self.frame_pc(frame)?;
        let notcurrent = match self.next_frame(frame)? {
            Some(next) => self.frame_kind(next)? == FrameKind::Normal,
            None => false,
        };
        Ok(self.symbols.find_line(pc, notcurrent))
    }

    /// The stack anchor of `frame`'s identity.
    pub fn frame_stack_addr(&mut self, frame: FrameRef) -> FrameResult<Option<Addr>> {
        Ok(self.frame_id(frame)?.stack_addr())
    }

    // ── Frame bases ──────────────────────────────────────────────────────────

    /// Base address of `frame`; 0 for anything but a normal frame.
    pub fn frame_base(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        self.base_query(frame, BaseQuery::Base)
    }

    /// Address locals are found relative to; 0 for anything but a normal
    /// frame.
    pub fn frame_locals_base(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        self.base_query(frame, BaseQuery::Locals)
    }

    /// Address arguments are found relative to; 0 for anything but a normal
    /// frame.
    pub fn frame_args_base(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        self.base_query(frame, BaseQuery::Args)
    }

    fn base_query(&mut self, frame: FrameRef, query: BaseQuery) -> FrameResult<Addr> {
        if self.frame_kind(frame)? != FrameKind::Normal {
            return Ok(0);
        }
        let provider = self.frame_base_provider(frame)?;
        let unwinder = self.frame_unwinder(frame)?;
        let slot = match provider.unwinder() {
            Some(shared) if same_unwinder(&shared, &unwinder) => CacheSlot::Prologue,
            _ => CacheSlot::Base,
        };
        let next = self.arena.get(frame)?.next;

        self.with_cache(frame, slot, |frames, cache| match query {
            BaseQuery::Base => provider.this_base(frames, next, cache),
            BaseQuery::Locals => provider.this_locals(frames, next, cache),
            BaseQuery::Args => provider.this_args(frames, next, cache),
        })
    }

    /// The frame-base provider for `frame`, resolved on first use.
    pub fn frame_base_provider(&mut self, frame: FrameRef) -> FrameResult<Rc<dyn FrameBase>> {
        let node = self.arena.get(frame)?;
        if let Some(base) = &node.base {
            return Ok(Rc::clone(base));
        }
        let next = node.next;

        let mut chosen = None;
        for provider in self.bases.providers().to_vec() {
            if provider.sniff(self, next)? {
                chosen = Some(provider);
                break;
            }
        }
        let provider = chosen.unwrap_or_else(|| self.bases.default_provider());

        self.arena.get_mut(frame)?.base = Some(Rc::clone(&provider));
        Ok(provider)
    }
}
