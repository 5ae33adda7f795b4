//! Printable frame summaries and whole-stack backtraces.

use crate::cache::FrameCache;
use crate::error::FrameResult;
use crate::frame::{FrameKind, FrameRef};
use crate::id::FrameId;
use crate::target::Addr;
use serde::Serialize;
use std::fmt;

/// What is known about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub level: i64,
    pub kind: Option<FrameKind>,
    pub unwinder: Option<String>,
    pub pc: Option<Addr>,
    pub id: Option<FrameId>,
    pub func: Option<Addr>,
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNKNOWN: &str = "<unknown>";
        write!(f, "{{level={},type=", self.level)?;
        match self.kind {
            Some(kind) => write!(f, "{kind}")?,
            None => f.write_str(UNKNOWN)?,
        }
        f.write_str(",unwind=")?;
        f.write_str(self.unwinder.as_deref().unwrap_or(UNKNOWN))?;
        f.write_str(",pc=")?;
        match self.pc {
            Some(pc) => write!(f, "{pc:#x}")?,
            None => f.write_str(UNKNOWN)?,
        }
        f.write_str(",id=")?;
        match &self.id {
            Some(id) => write!(f, "{id}")?,
            None => f.write_str(UNKNOWN)?,
        }
        f.write_str(",func=")?;
        match self.func {
            Some(func) => write!(f, "{func:#x}")?,
            None => f.write_str(UNKNOWN)?,
        }
        f.write_str("}")
    }
}

impl FrameCache {
    /// Summary of whatever has already been computed for `frame`. Never
    /// triggers any unwinding.
    pub fn snapshot_frame(&self, frame: FrameRef) -> FrameResult<FrameSummary> {
        let node = self.arena.get(frame)?;
        let next = self.arena.get(node.next)?;
        Ok(FrameSummary {
            level: node.level,
            kind: node.unwind.as_ref().map(|u| u.kind()),
            unwinder: node.unwind.as_ref().map(|u| u.name().to_string()),
            pc: next.prev_pc,
            id: node.this_id,
            func: next.prev_func.flatten(),
        })
    }

    /// Summary of `frame` with every field computed.
    pub fn describe_frame(&mut self, frame: FrameRef) -> FrameResult<FrameSummary> {
        self.frame_kind(frame)?;
        self.frame_pc(frame)?;
        self.frame_id(frame)?;
        self.frame_func(frame)?;
        self.snapshot_frame(frame)
    }

    /// Summaries of the chain from the current frame outward, stopping
    /// where backtrace policy says to.
    pub fn backtrace(&mut self) -> FrameResult<Vec<FrameSummary>> {
        let mut summaries = Vec::new();
        let mut frame = Some(self.current_frame()?);
        while let Some(this) = frame {
            summaries.push(self.describe_frame(this)?);
            frame = self.previous_frame(Some(this))?;
        }
        Ok(summaries)
    }
}
