//! The target-access collaborator.
//!
//! A [`Target`] is whatever owns the live register set and memory of the
//! program being debugged: a ptrace'd process, a core file, a simulator.
//! The frame cache only ever reads through it, except when a register is
//! written through a frame or a frame is popped.

use thiserror::Error;

/// A target address.
pub type Addr = u64;

/// An architecture register number.
pub type RegNum = usize;

/// Failures reported by a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("Cannot access memory at address {addr:#x}")]
    MemoryAccess { addr: Addr },

    #[error("Cannot access register {regnum}")]
    RegisterAccess { regnum: RegNum },

    #[error("{0}")]
    Other(String),
}

/// Access to the live state of the program being debugged.
pub trait Target {
    /// The target has a register set (it is stopped, or a core is loaded).
    fn has_registers(&self) -> bool;

    /// The target has a stack to unwind.
    fn has_stack(&self) -> bool;

    /// The target has readable memory.
    fn has_memory(&self) -> bool;

    /// A live inferior is attached. A core file has registers but no
    /// execution.
    fn has_execution(&self) -> bool {
        self.has_registers()
    }

    /// Read the raw bytes of register `regnum` from the live register set.
    fn read_register(&self, regnum: RegNum) -> Result<Vec<u8>, TargetError>;

    /// Overwrite register `regnum` in the live register set.
    fn write_register(&mut self, regnum: RegNum, bytes: &[u8]) -> Result<(), TargetError>;

    /// Fill `buf` from target memory at `addr`.
    fn read_memory(&self, addr: Addr, buf: &mut [u8]) -> Result<(), TargetError>;

    /// Write `bytes` to target memory at `addr`.
    fn write_memory(&mut self, addr: Addr, bytes: &[u8]) -> Result<(), TargetError>;
}
