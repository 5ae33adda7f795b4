//! Cairn stack-frame cache.
//!
//! Reconstructs the call stack of a stopped program one frame at a time,
//! on demand. Each [`FrameRef`] handed out names a cached frame whose
//! identity, resume address, function and register values are computed
//! lazily and remembered until the cache is flushed.
//!
//! The cache does not know how to read a process, decode an architecture's
//! prologues or look up symbols. Those are supplied through the
//! [`Target`], [`Arch`], [`Symbols`], [`Unwinder`] and [`FrameBase`]
//! traits.
//!
//! # Lifecycle
//!
//! - [`FrameCache::current_frame`] builds the sentinel frame and the
//!   innermost real frame.
//! - [`FrameCache::previous_frame`] grows the chain outward, subject to the
//!   backtrace policy in [`BacktraceSettings`].
//! - [`FrameCache::flush`] must be called whenever the target runs or its
//!   registers change; every outstanding [`FrameRef`] becomes stale.
//!
//! # Example
//!
//! ```rust,no_run
//! use cairn_frames::{Arch, FrameCache, Target, UnwinderRegistry};
//! use std::rc::Rc;
//!
//! fn print_backtrace(target: Box<dyn Target>, arch: Rc<dyn Arch>, unwinders: UnwinderRegistry) {
//!     let mut frames = FrameCache::new(target, arch).with_unwinders(unwinders);
//!     match frames.backtrace() {
//!         Ok(summaries) => {
//!             for summary in summaries {
//!                 println!("{summary}");
//!             }
//!         }
//!         Err(err) => eprintln!("backtrace failed: {err}"),
//!     }
//! }
//! ```

pub mod accessors;
pub mod arch;
pub mod base;
pub mod cache;
pub mod error;
pub mod frame;
pub mod id;
pub mod registers;
pub mod session;
pub mod summary;
pub mod symbols;
pub mod target;
pub mod unwind;

pub use arch::{Arch, ByteOrder, StackDirection};
pub use base::{DefaultFrameBase, FrameBase, FrameBaseRegistry};
pub use cache::FrameCache;
pub use error::{FrameError, FrameResult};
pub use frame::{FrameKind, FrameRef, PrologueCache, SENTINEL_LEVEL};
pub use id::FrameId;
pub use session::LanguageState;
pub use summary::FrameSummary;
pub use symbols::{Language, NoSymbols, SourceLine, Symbols};
pub use target::{Addr, RegNum, Target, TargetError};
pub use unwind::{RegisterLocation, RegisterValue, SentinelUnwinder, Unwinder, UnwinderRegistry};

pub use cairn_config::{BacktraceSettings, LanguageMode};
