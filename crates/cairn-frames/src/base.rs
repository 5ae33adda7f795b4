//! Frame-base providers: where a frame's locals and arguments live.

use crate::cache::FrameCache;
use crate::error::FrameResult;
use crate::frame::{FrameRef, PrologueCache};
use crate::target::Addr;
use crate::unwind::Unwinder;
use std::fmt;
use std::rc::Rc;

/// Supplies the base addresses used to locate a frame's variables.
///
/// As with [`Unwinder`], `next` is the inner neighbour of the described
/// frame. When [`FrameBase::unwinder`] returns the very unwinder that
/// claimed the frame, the provider is handed that unwinder's prologue cache
/// instead of a separate one, so the analysis is done once.
///
/// The cache is lent out for the duration of each call. Queries that reach
/// back into the described frame itself (its identity, say) while its
/// unwinder has not finished them yet run against an empty slot of their
/// own and may redo the analysis; prefer working from `cache` and `next`.
pub trait FrameBase {
    fn name(&self) -> &str;

    /// The unwinder whose analysis this provider builds on, if any.
    fn unwinder(&self) -> Option<Rc<dyn Unwinder>> {
        None
    }

    /// Does this provider apply to the frame outer to `next`?
    fn sniff(&self, frames: &mut FrameCache, next: FrameRef) -> FrameResult<bool>;

    /// The frame's base address (e.g. the frame pointer).
    fn this_base(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr>;

    fn this_locals(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        self.this_base(frames, next, cache)
    }

    fn this_args(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        cache: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        self.this_base(frames, next, cache)
    }
}

/// Fallback provider: every base is the frame's identity stack address.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFrameBase;

impl FrameBase for DefaultFrameBase {
    fn name(&self) -> &str {
        "default"
    }

    fn sniff(&self, _: &mut FrameCache, _: FrameRef) -> FrameResult<bool> {
        Ok(true)
    }

    fn this_base(
        &self,
        frames: &mut FrameCache,
        next: FrameRef,
        _: &mut PrologueCache,
    ) -> FrameResult<Addr> {
        Ok(frames.unwind_id(next)?.stack_addr().unwrap_or(0))
    }
}

/// Ordered frame-base providers plus a default used when none applies.
#[derive(Clone)]
pub struct FrameBaseRegistry {
    providers: Vec<Rc<dyn FrameBase>>,
    default: Rc<dyn FrameBase>,
}

impl FrameBaseRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            default: Rc::new(DefaultFrameBase),
        }
    }

    pub fn append(&mut self, provider: Rc<dyn FrameBase>) {
        self.providers.push(provider);
    }

    pub fn prepend(&mut self, provider: Rc<dyn FrameBase>) {
        self.providers.insert(0, provider);
    }

    /// Replace the provider used when no other one sniffs a frame.
    pub fn set_default(&mut self, provider: Rc<dyn FrameBase>) {
        self.default = provider;
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub(crate) fn providers(&self) -> &[Rc<dyn FrameBase>] {
        &self.providers
    }

    pub(crate) fn default_provider(&self) -> Rc<dyn FrameBase> {
        Rc::clone(&self.default)
    }
}

impl Default for FrameBaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameBaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBaseRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("default", &self.default.name())
            .finish()
    }
}
