//! The symbol-lookup collaborator.

use crate::target::Addr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source position for a code address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    pub file: String,
    pub line: u32,
    /// First address of the line's code.
    pub pc: Addr,
    /// One past the last address of the line's code.
    pub end: Addr,
}

/// Source language of a piece of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Unknown,
    C,
    Cplus,
    ObjC,
    Asm,
    Fortran,
    Ada,
    Rust,
    Go,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Unknown => "unknown",
            Language::C => "c",
            Language::Cplus => "c++",
            Language::ObjC => "objective-c",
            Language::Asm => "asm",
            Language::Fortran => "fortran",
            Language::Ada => "ada",
            Language::Rust => "rust",
            Language::Go => "go",
        };
        f.write_str(name)
    }
}

/// Address to symbol resolution.
///
/// Every method has a "nothing known" default, so an implementation only
/// supplies what its debug information provides.
pub trait Symbols {
    /// Start address of the function containing `pc`.
    fn function_start(&self, pc: Addr) -> Option<Addr> {
        let _ = pc;
        None
    }

    /// Address of the program's `main` function, as a function pointer.
    fn main_address(&self) -> Option<Addr> {
        None
    }

    /// Source line for `pc`.
    ///
    /// `notcurrent` is set when `pc` is a return address: the line wanted is
    /// the one containing the call, which may end just before `pc`.
    fn find_line(&self, pc: Addr, notcurrent: bool) -> Option<SourceLine> {
        let _ = (pc, notcurrent);
        None
    }

    /// Language of the code at `pc`.
    fn language_at(&self, pc: Addr) -> Language {
        let _ = pc;
        Language::Unknown
    }
}

/// A symbol table that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl Symbols for NoSymbols {}
