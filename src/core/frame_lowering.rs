// This module defines FrameLowering, the per-target policy object that decides how a
// function's stack frame is built and torn down. The prologue/epilogue inserter calls its
// hooks in a fixed order: analyze_frame fixes whether a frame pointer and a reserved call
// frame are used, determine_callee_saves chooses the registers to preserve, emit_prologue
// and emit_epilogue insert the entry and exit sequences, and
// eliminate_call_frame_pseudo_instr removes the ADJCALLSTACK pseudos around calls. Frame
// facts are stored on the function after analysis so every later hook and the register
// info see the same answer. Implementations are immutable after construction and shared
// between threads.

//! Target frame lowering hooks.

use super::frame_info::FrameFacts;
use super::machine::{BlockId, FramePhase, MachineFunction};
use super::regs::{PhysReg, RegSet};
use super::scavenger::RegScavenger;

/// Frame-construction policy of a subtarget.
///
/// Every hook is total: it either transforms the function or leaves it unchanged.
/// Ordering preconditions are checked with debug assertions through the
/// function's [`FramePhase`].
pub trait FrameLowering: Send + Sync {
    /// Stack alignment guaranteed at call boundaries, in bytes.
    fn stack_alignment(&self) -> u32;

    /// Callee-saved registers of the calling convention, in save order.
    fn callee_saved_regs(&self) -> &[PhysReg];

    /// Whether `mf` needs a dedicated frame-pointer register.
    fn has_fp(&self, mf: &MachineFunction) -> bool;

    /// Whether the outgoing argument area is part of the fixed frame, so that
    /// call-frame pseudos need no SP adjustment of their own.
    fn has_reserved_call_frame(&self, mf: &MachineFunction) -> bool;

    /// Whether the prologue must realign SP beyond [`Self::stack_alignment`].
    fn needs_stack_realignment(&self, _mf: &MachineFunction) -> bool {
        false
    }

    /// Replace the call-frame pseudo at `at` and return the position of the
    /// instruction that followed it.
    fn eliminate_call_frame_pseudo_instr(
        &self,
        mf: &mut MachineFunction,
        block: BlockId,
        at: usize,
    ) -> usize;

    /// Insert the prologue at the start of `block`.
    fn emit_prologue(&self, mf: &mut MachineFunction, block: BlockId);

    /// Insert the epilogue directly before the return instruction of `block`, after any
    /// conditional branch that leaves the block.
    fn emit_epilogue(&self, mf: &mut MachineFunction, block: BlockId);

    /// Add to `saved` the callee-saved registers `mf` must preserve.
    ///
    /// The default adds every callee-saved register written by some instruction.
    /// The set is only ever extended.
    fn determine_callee_saves(
        &self,
        mf: &mut MachineFunction,
        saved: &mut RegSet,
        _scavenger: Option<&mut RegScavenger>,
    ) {
        saved.union_with(&clobbered_callee_saves(self.callee_saved_regs(), mf));
        mf.advance_phase(FramePhase::CalleeSavesDetermined);
    }

    /// Compute and record the frame facts of `mf`.
    fn analyze_frame(&self, mf: &mut MachineFunction) -> FrameFacts {
        let facts = FrameFacts {
            has_fp: self.has_fp(mf),
            reserved_call_frame: self.has_reserved_call_frame(mf),
            realign_stack: self.needs_stack_realignment(mf),
        };
        mf.set_frame_facts(facts);
        if mf.phase() == FramePhase::Unanalyzed {
            mf.advance_phase(FramePhase::Analyzed);
        }
        log::debug!(
            "{}: has_fp={} reserved_call_frame={} realign={}",
            mf.name,
            facts.has_fp,
            facts.reserved_call_frame,
            facts.realign_stack
        );
        facts
    }
}

/// Callee-saved registers from `csrs` that some instruction of `mf` writes.
pub fn clobbered_callee_saves(csrs: &[PhysReg], mf: &MachineFunction) -> RegSet {
    let candidates = RegSet::from_regs(csrs);
    let mut clobbered = RegSet::new();
    for inst in mf.instrs() {
        clobbered.extend(inst.defs().filter(|reg| candidates.contains(*reg)));
    }
    clobbered
}
