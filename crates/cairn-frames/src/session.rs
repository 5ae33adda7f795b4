//! Selection, invalidation and policy state around the frame cache.

use crate::cache::FrameCache;
use crate::error::FrameResult;
use crate::frame::FrameRef;
use crate::symbols::Language;
use crate::target::Target;
use cairn_config::{BacktraceSettings, LanguageMode};
use tracing::debug;

// ── LanguageState ────────────────────────────────────────────────────────────

/// The language expressions are currently evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LanguageState {
    current: Language,
    mode: LanguageMode,
}

impl LanguageState {
    pub fn new(mode: LanguageMode) -> Self {
        Self {
            current: Language::Unknown,
            mode,
        }
    }

    pub fn current(&self) -> Language {
        self.current
    }

    pub fn mode(&self) -> LanguageMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: LanguageMode) {
        self.mode = mode;
    }

    /// Set the language by hand. This also switches to manual mode.
    pub fn set_language(&mut self, language: Language) {
        self.current = language;
        self.mode = LanguageMode::Manual;
    }

    /// Follow the language of a newly selected frame. Only happens in auto
    /// mode, and never to [`Language::Unknown`]. Returns true if the
    /// language changed.
    pub fn observe_frame_language(&mut self, language: Language) -> bool {
        if self.mode != LanguageMode::Auto
            || language == Language::Unknown
            || language == self.current
        {
            return false;
        }
        self.current = language;
        true
    }
}

// ── Session operations ───────────────────────────────────────────────────────

impl FrameCache {
    /// Discard every cached frame. All [`FrameRef`]s issued so far become
    /// stale, and nothing is selected afterwards.
    pub fn flush(&mut self) {
        debug!(
            frames = self.arena.len(),
            generation = self.arena.generation(),
            "flushing frame cache"
        );
        self.arena.clear();
        self.current = None;
        self.selected = None;
    }

    /// Flush, then select the new current frame if an inferior is running.
    pub fn reinit(&mut self) -> FrameResult<()> {
        self.flush();
        if self.target.has_execution() {
            let current = self.current_frame()?;
            self.select_frame(Some(current))?;
        }
        Ok(())
    }

    /// Make `frame` the selected frame, or clear the selection.
    ///
    /// In auto language mode the current language follows the code the
    /// frame is executing.
    pub fn select_frame(&mut self, frame: Option<FrameRef>) -> FrameResult<()> {
        let Some(frame) = frame else {
            self.selected = None;
            return Ok(());
        };
        let level = self.level(frame)?;
        let pc = self.address_in_block(frame)?;
        self.selected = Some(frame);

        let language = self.symbols.language_at(pc);
        if self.language.observe_frame_language(language) {
            debug!(level, %language, "language switched to match selected frame");
        }
        debug!(level, "frame selected");
        Ok(())
    }

    /// The selected frame, without selecting anything.
    pub fn selected(&self) -> Option<FrameRef> {
        self.selected
    }

    /// The selected frame. If nothing is selected yet the current frame is
    /// selected first.
    pub fn selected_frame(&mut self) -> FrameResult<FrameRef> {
        if let Some(selected) = self.selected {
            return Ok(selected);
        }
        let current = self.current_frame()?;
        self.select_frame(Some(current))?;
        Ok(current)
    }

    /// Like [`FrameCache::selected_frame`], but `None` when the target has no
    /// registers, stack or memory.
    pub fn safe_selected_frame(&mut self) -> FrameResult<Option<FrameRef>> {
        if self.check_target_state().is_err() {
            return Ok(None);
        }
        self.selected_frame().map(Some)
    }

    /// Switch to a different target, returning the old one.
    pub fn replace_target(&mut self, target: Box<dyn Target>) -> Box<dyn Target> {
        self.flush();
        std::mem::replace(&mut self.target, target)
    }

    // ── Policy ───────────────────────────────────────────────────────────────

    pub fn settings(&self) -> BacktraceSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: BacktraceSettings) {
        self.settings = settings;
    }

    pub fn set_past_main(&mut self, past_main: bool) {
        self.settings.past_main = past_main;
    }

    /// Set the depth limit; `None` or `Some(0)` removes it.
    pub fn set_backtrace_limit(&mut self, limit: Option<u32>) {
        self.settings = self.settings.with_limit(limit);
    }

    // ── Language ─────────────────────────────────────────────────────────────

    pub fn language(&self) -> Language {
        self.language.current()
    }

    pub fn language_mode(&self) -> LanguageMode {
        self.language.mode()
    }

    pub fn set_language(&mut self, language: Language) {
        self.language.set_language(language);
    }

    pub fn set_language_mode(&mut self, mode: LanguageMode) {
        self.language.set_mode(mode);
    }
}
