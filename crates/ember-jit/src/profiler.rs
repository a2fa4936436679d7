//! Pseudo-stack for the sampling profiler.
//!
//! Compiled code reports script entry and exit so a sampler can read the
//! current call stack without walking native frames. Frames past
//! `max_depth` are counted but not stored, matching what the sampler can
//! display.

use crate::script::ScriptId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ProfilerStack {
    frames: Vec<ScriptId>,
    /// Logical depth including frames beyond `max_depth`
    depth: usize,
    max_depth: usize,
    entries: HashMap<ScriptId, u64>,
    enabled: bool,
}

impl ProfilerStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            depth: 0,
            max_depth,
            entries: HashMap::new(),
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enter(&mut self, script: ScriptId) {
        if !self.enabled {
            return;
        }
        if self.depth < self.max_depth {
            self.frames.push(script);
        }
        self.depth += 1;
        *self.entries.entry(script).or_insert(0) += 1;
    }

    /// Pop `script`; returns false if it is not the innermost entry
    pub fn exit(&mut self, script: ScriptId) -> bool {
        if !self.enabled {
            return true;
        }
        if self.depth == 0 {
            return false;
        }
        if self.depth <= self.max_depth {
            if self.frames.last() != Some(&script) {
                return false;
            }
            self.frames.pop();
        }
        self.depth -= 1;
        true
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Stored frames, outermost first
    pub fn frames(&self) -> &[ScriptId] {
        &self.frames
    }

    pub fn entry_count(&self, script: ScriptId) -> u64 {
        self.entries.get(&script).copied().unwrap_or(0)
    }
}
