// This module provides arena-based session management for the prologue/epilogue inserter
// using the bumpalo crate. A CompilationSession owns a reference to a Bump arena that the
// inserter uses for per-function scratch data (spill slot orderings, block worklists), plus
// a RefCell of SessionStats that records what frame lowering did: how many functions were
// processed, how many prologue and epilogue instructions were emitted, how many call-frame
// pseudos and frame indices were eliminated, and how often the register scavenger had to
// spill. A session is single-threaded; concurrent compilation uses one session per thread
// while sharing the subtarget.

//! Arena-based compilation session management.

use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;

/// Per-thread state for lowering a sequence of functions.
pub struct CompilationSession<'arena> {
    /// Arena allocator for per-function scratch data.
    arena: &'arena Bump,

    /// Session statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// Function currently being lowered.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_function: RefCell::new(None),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Clear per-function state once a function is done.
    pub fn finish_function(&self) {
        *self.current_function.borrow_mut() = None;
    }

    /// Record that a function's frame was lowered.
    pub fn record_function_lowered(&self, name: &str, stack_size: u32, has_fp: bool) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_lowered += 1;
        if has_fp {
            stats.functions_with_fp += 1;
        }
        if stats.largest_frame_size < stack_size || stats.largest_frame_name.is_empty() {
            stats.largest_frame_size = stack_size;
            stats.largest_frame_name = name.to_string();
        }
    }

    pub fn record_prologue(&self, instructions: usize) {
        self.stats.borrow_mut().prologue_instructions += instructions;
    }

    pub fn record_epilogue(&self, instructions: usize) {
        self.stats.borrow_mut().epilogue_instructions += instructions;
    }

    pub fn record_callee_saved(&self, count: usize) {
        self.stats.borrow_mut().callee_saved_spilled += count;
    }

    pub fn record_call_frame_pseudo(&self) {
        self.stats.borrow_mut().call_frame_pseudos_eliminated += 1;
    }

    pub fn record_frame_index(&self) {
        self.stats.borrow_mut().frame_indices_eliminated += 1;
    }

    pub fn record_scavenger_spill(&self) {
        self.stats.borrow_mut().scavenger_spills += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Frame lowering statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub functions_lowered: usize,
    pub functions_with_fp: usize,
    pub prologue_instructions: usize,
    pub epilogue_instructions: usize,
    /// Callee-saved registers spilled across all functions.
    pub callee_saved_spilled: usize,
    pub call_frame_pseudos_eliminated: usize,
    pub frame_indices_eliminated: usize,
    /// Times the scavenger had to free a register through its emergency slot.
    pub scavenger_spills: usize,
    pub largest_frame_size: u32,
    pub largest_frame_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame Lowering Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Functions with frame pointer: {}", self.functions_with_fp)?;
        writeln!(f, "  Prologue instructions: {}", self.prologue_instructions)?;
        writeln!(f, "  Epilogue instructions: {}", self.epilogue_instructions)?;
        writeln!(f, "  Callee-saved registers spilled: {}", self.callee_saved_spilled)?;
        writeln!(
            f,
            "  Call frame pseudos eliminated: {}",
            self.call_frame_pseudos_eliminated
        )?;
        writeln!(f, "  Frame indices eliminated: {}", self.frame_indices_eliminated)?;
        writeln!(f, "  Scavenger spills: {}", self.scavenger_spills)?;

        if !self.largest_frame_name.is_empty() {
            writeln!(
                f,
                "  Largest frame: {} ({} bytes)",
                self.largest_frame_name, self.largest_frame_size
            )?;
        }

        Ok(())
    }
}
