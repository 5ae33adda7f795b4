//! The architecture collaborator.
//!
//! Describes the register file and stack layout of the target machine and
//! optionally supplies direct PC/SP unwinding.

use crate::cache::FrameCache;
use crate::error::FrameResult;
use crate::frame::FrameRef;
use crate::target::{Addr, RegNum};
use serde::{Deserialize, Serialize};

// ── StackDirection ───────────────────────────────────────────────────────────

/// The direction in which the stack grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StackDirection {
    /// Towards lower addresses; inner frames have smaller stack addresses.
    #[default]
    Down,
    /// Towards higher addresses; inner frames have larger stack addresses.
    Up,
}

impl StackDirection {
    /// Returns true if a frame anchored at `lhs` is deeper in the stack than
    /// one anchored at `rhs`.
    pub fn inner_than(self, lhs: Addr, rhs: Addr) -> bool {
        match self {
            StackDirection::Down => lhs < rhs,
            StackDirection::Up => lhs > rhs,
        }
    }
}

// ── ByteOrder ────────────────────────────────────────────────────────────────

/// Byte order of register and memory contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Interpret `bytes` as an unsigned integer.
    ///
    /// Values wider than 64 bits keep only their least significant 8 bytes.
    pub fn extract_unsigned(self, bytes: &[u8]) -> u64 {
        let significant: Vec<u8> = match self {
            ByteOrder::Little => bytes.iter().take(8).rev().copied().collect(),
            ByteOrder::Big => bytes[bytes.len().saturating_sub(8)..].to_vec(),
        };
        significant
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
    }

    /// Interpret `bytes` as a two's complement signed integer.
    pub fn extract_signed(self, bytes: &[u8]) -> i64 {
        let width = bytes.len().min(8);
        let raw = self.extract_unsigned(bytes);
        if width == 0 || width == 8 {
            return raw as i64;
        }
        let shift = 64 - 8 * width as u32;
        ((raw << shift) as i64) >> shift
    }

    /// Encode `value` into `len` bytes.
    pub fn store_unsigned(self, value: u64, len: usize) -> Vec<u8> {
        let mut bytes: Vec<u8> = (0..len)
            .map(|i| if i < 8 { (value >> (8 * i)) as u8 } else { 0 })
            .collect();
        if self == ByteOrder::Big {
            bytes.reverse();
        }
        bytes
    }
}

// ── Arch ─────────────────────────────────────────────────────────────────────

/// Architecture description consumed by the frame cache.
pub trait Arch {
    /// Printable architecture name.
    fn name(&self) -> &str;

    fn stack_direction(&self) -> StackDirection {
        StackDirection::Down
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }

    /// Number of registers; valid register numbers are `0..num_registers()`.
    fn num_registers(&self) -> usize;

    fn register_name(&self, regnum: RegNum) -> Option<&str>;

    /// Size in bytes of the raw contents of `regnum`.
    fn register_size(&self, regnum: RegNum) -> usize;

    /// Map a user-visible register name to its number.
    fn register_number(&self, name: &str) -> Option<RegNum> {
        (0..self.num_registers()).find(|&regnum| self.register_name(regnum) == Some(name))
    }

    fn pc_regnum(&self) -> RegNum;

    /// The stack pointer register, if the architecture has a single one.
    fn sp_regnum(&self) -> Option<RegNum>;

    /// Resume address of the frame outer to `next`, if this architecture
    /// knows how to compute it directly.
    ///
    /// Returning `Ok(None)` means "not provided"; the cache then falls back
    /// to reading the live PC, which is only legal for the sentinel frame.
    fn unwind_pc(&self, frames: &mut FrameCache, next: FrameRef) -> FrameResult<Option<Addr>> {
        let _ = (frames, next);
        Ok(None)
    }

    /// Stack pointer of the frame outer to `next`, if computed directly.
    fn unwind_sp(&self, frames: &mut FrameCache, next: FrameRef) -> FrameResult<Option<Addr>> {
        let _ = (frames, next);
        Ok(None)
    }

    /// Turn a function pointer (possibly a descriptor) into a code address.
    fn convert_from_func_ptr_addr(&self, addr: Addr) -> Addr {
        addr
    }
}
