//! Register and memory access through frames.
//!
//! A register "in" a frame is whatever the frame's inner neighbour says the
//! register held when this frame was suspended, so every read goes through
//! the inner neighbour's unwinder. Writes locate the register the same way
//! and store to wherever it was found.

use crate::cache::FrameCache;
use crate::error::{FrameError, FrameResult};
use crate::frame::FrameRef;
use crate::target::{Addr, RegNum};
use crate::unwind::{RegisterLocation, RegisterValue};
use std::rc::Rc;
use tracing::{debug, trace};

impl FrameCache {
    // ── Reading ──────────────────────────────────────────────────────────────

    /// Value of `regnum` in the frame outer to `next`.
    pub fn frame_register_unwind(
        &mut self,
        next: FrameRef,
        regnum: RegNum,
    ) -> FrameResult<RegisterValue> {
        self.check_regnum(regnum)?;
        let value = self.with_unwinder(next, |unwinder, frames, next_next, cache| {
            unwinder.prev_register(frames, next_next, cache, regnum)
        })?;
        trace!(
            next_level = self.arena.get(next).map(|n| n.level).unwrap_or_default(),
            regnum,
            optimized_out = value.optimized_out,
            location = ?value.location,
            "register unwound"
        );
        Ok(value)
    }

    /// Value of `regnum` in `frame`.
    pub fn frame_register(&mut self, frame: FrameRef, regnum: RegNum) -> FrameResult<RegisterValue> {
        let next = self.arena.get(frame)?.next;
        self.frame_register_unwind(next, regnum)
    }

    /// Raw contents of `regnum` in `frame`; `None` when optimized out.
    pub fn frame_register_read(
        &mut self,
        frame: FrameRef,
        regnum: RegNum,
    ) -> FrameResult<Option<Vec<u8>>> {
        let value = self.frame_register(frame, regnum)?;
        if value.optimized_out {
            return Ok(None);
        }
        Ok(value.bytes)
    }

    pub fn unwind_register_unsigned(&mut self, next: FrameRef, regnum: RegNum) -> FrameResult<u64> {
        let bytes = self.unwind_register_bytes(next, regnum)?;
        Ok(self.arch.byte_order().extract_unsigned(&bytes))
    }

    pub fn unwind_register_signed(&mut self, next: FrameRef, regnum: RegNum) -> FrameResult<i64> {
        let bytes = self.unwind_register_bytes(next, regnum)?;
        Ok(self.arch.byte_order().extract_signed(&bytes))
    }

    pub fn frame_register_unsigned(&mut self, frame: FrameRef, regnum: RegNum) -> FrameResult<u64> {
        let next = self.arena.get(frame)?.next;
        self.unwind_register_unsigned(next, regnum)
    }

    pub fn frame_register_signed(&mut self, frame: FrameRef, regnum: RegNum) -> FrameResult<i64> {
        let next = self.arena.get(frame)?.next;
        self.unwind_register_signed(next, regnum)
    }

    fn unwind_register_bytes(&mut self, next: FrameRef, regnum: RegNum) -> FrameResult<Vec<u8>> {
        let value = self.frame_register_unwind(next, regnum)?;
        match value.bytes {
            Some(bytes) if !value.optimized_out => Ok(bytes),
            _ => Err(FrameError::RegisterUnavailable(regnum)),
        }
    }

    fn check_regnum(&self, regnum: RegNum) -> FrameResult<()> {
        if regnum >= self.arch.num_registers() {
            return Err(FrameError::UnknownRegister(regnum));
        }
        Ok(())
    }

    /// Register number for a user-visible register name.
    pub fn register_number(&self, name: &str) -> Option<RegNum> {
        self.arch.register_number(name)
    }

    pub fn register_name(&self, regnum: RegNum) -> Option<&str> {
        self.arch.register_name(regnum)
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Store `bytes` into `regnum` as seen from `frame`.
    ///
    /// The register is written wherever `frame`'s callee saved it. Since
    /// that changes target state, the cache is flushed afterwards and the
    /// previously selected frame is found again by identity.
    pub fn put_frame_register(
        &mut self,
        frame: FrameRef,
        regnum: RegNum,
        bytes: &[u8],
    ) -> FrameResult<()> {
        self.check_regnum(regnum)?;
        let expected = self.arch.register_size(regnum);
        if bytes.len() != expected {
            return Err(FrameError::RegisterSizeMismatch {
                regnum,
                expected,
                actual: bytes.len(),
            });
        }

        let value = self.frame_register(frame, regnum)?;
        if value.optimized_out {
            return Err(FrameError::OptimizedOut);
        }
        let written = match value.location {
            RegisterLocation::Memory(addr) => self.target.write_memory(addr, bytes),
            RegisterLocation::Register(realnum) => self.target.write_register(realnum, bytes),
            RegisterLocation::NotLval => return Err(FrameError::Unmodifiable),
        };
        debug!(regnum, location = ?value.location, ok = written.is_ok(), "register written through frame");

        // The target may have changed even if the write reported failure.
        self.registers_changed();
        Ok(written?)
    }

    /// Flush after a register write and select the same frame again.
    ///
    /// Never fails: the flush always happens, and a selection that cannot
    /// be found again is dropped.
    fn registers_changed(&mut self) {
        let selected = self.selected;
        let selected_id = match selected.map(|frame| self.frame_id(frame)) {
            Some(Ok(id)) => Some(id),
            Some(Err(error)) => {
                debug!(%error, "selected frame has no identity; dropping selection");
                None
            }
            None => None,
        };
        self.flush();

        let Some(id) = selected_id else {
            return;
        };
        let reselected = match self.find_by_id(&id) {
            Ok(Some(frame)) => self.select_frame(Some(frame)),
            Ok(None) => {
                debug!(id = %id, "previously selected frame is gone");
                Ok(())
            }
            Err(error) => Err(error),
        };
        if let Err(error) = reselected {
            debug!(id = %id, %error, "could not reselect frame");
        }
    }

    // ── Stack pointer ────────────────────────────────────────────────────────

    /// Stack pointer of the frame outer to `next`.
    pub fn sp_unwind(&mut self, next: FrameRef) -> FrameResult<Addr> {
        let arch = Rc::clone(&self.arch);
        if let Some(sp) = arch.unwind_sp(self, next)? {
            return Ok(sp);
        }
        match arch.sp_regnum() {
            Some(regnum) => self.unwind_register_unsigned(next, regnum),
            None => Err(FrameError::Internal(format!(
                "{} has no unwind_sp method and no stack pointer register",
                arch.name()
            ))),
        }
    }

    /// Stack pointer of `frame`.
    pub fn frame_sp(&mut self, frame: FrameRef) -> FrameResult<Addr> {
        let next = self.arena.get(frame)?.next;
        self.sp_unwind(next)
    }

    // ── Memory ───────────────────────────────────────────────────────────────

    /// Read `len` bytes of target memory.
    pub fn read_memory(&self, addr: Addr, len: usize) -> FrameResult<Vec<u8>> {
        let mut buf = vec![0; len];
        self.target.read_memory(addr, &mut buf)?;
        Ok(buf)
    }

    /// Read a `len`-byte unsigned integer from target memory.
    pub fn read_memory_unsigned(&self, addr: Addr, len: usize) -> FrameResult<u64> {
        let bytes = self.read_memory(addr, len)?;
        Ok(self.arch.byte_order().extract_unsigned(&bytes))
    }

    /// Read memory in the context of `frame`.
    pub fn read_frame_memory(&self, frame: FrameRef, addr: Addr, len: usize) -> FrameResult<Vec<u8>> {
        self.arena.get(frame)?;
        self.read_memory(addr, len)
    }

    pub fn read_frame_memory_unsigned(
        &self,
        frame: FrameRef,
        addr: Addr,
        len: usize,
    ) -> FrameResult<u64> {
        let bytes = self.read_frame_memory(frame, addr, len)?;
        Ok(self.arch.byte_order().extract_unsigned(&bytes))
    }

    pub fn read_frame_memory_signed(
        &self,
        frame: FrameRef,
        addr: Addr,
        len: usize,
    ) -> FrameResult<i64> {
        let bytes = self.read_frame_memory(frame, addr, len)?;
        Ok(self.arch.byte_order().extract_signed(&bytes))
    }

    /// Fill `buf` from memory; false instead of an error on failure.
    pub fn safe_read_frame_memory(&self, frame: FrameRef, addr: Addr, buf: &mut [u8]) -> bool {
        self.arena.contains(frame) && self.target.read_memory(addr, buf).is_ok()
    }

    // ── Popping ──────────────────────────────────────────────────────────────

    /// Return from `frame`: load the caller's registers into the live
    /// register set, then flush.
    pub fn pop_frame(&mut self, frame: FrameRef) -> FrameResult<()> {
        let prev = self
            .grow_outward(frame)?
            .ok_or(FrameError::NoPreviousFrame)?;

        // Collect everything first; writing as we go would change what the
        // remaining reads see.
        let mut saved = Vec::new();
        for regnum in 0..self.arch.num_registers() {
            if let Some(bytes) = self.frame_register_read(prev, regnum)? {
                saved.push((regnum, bytes));
            }
        }
        let written = saved
            .iter()
            .try_for_each(|(regnum, bytes)| self.target.write_register(*regnum, bytes));

        debug!(registers = saved.len(), ok = written.is_ok(), "frame popped");
        self.flush();
        Ok(written?)
    }
}
