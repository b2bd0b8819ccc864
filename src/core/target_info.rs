// This module defines the trait seams through which target-independent code talks to a
// concrete subtarget. TargetInstrInfo describes the opcode table (lookup by number and by
// mnemonic, the call-frame pseudo opcodes, and whether an opcode is legal for the active
// feature set). TargetRegisterInfo describes the register file (names, callee-saved and
// reserved sets, the frame register, spill sizes) and rewrites abstract frame-index
// operands into concrete base-plus-offset addressing. TargetSubtarget bundles the
// per-subtarget objects together with the immutable SubtargetConfig they were built from.
// All three traits require Send + Sync so one subtarget can serve many threads.

//! Target description traits.

use super::features::SubtargetConfig;
use super::frame_lowering::FrameLowering;
use super::machine::{BlockId, InstrDesc, MachineFunction, MachineInstr};
use super::regs::{PhysReg, RegSet};
use super::scavenger::RegScavenger;

/// Opcode table of a target.
pub trait TargetInstrInfo: Send + Sync {
    /// All opcode descriptions, indexed by opcode number.
    fn descs(&self) -> &'static [InstrDesc];

    fn desc(&self, opcode: u16) -> Option<&'static InstrDesc> {
        self.descs().get(opcode as usize)
    }

    /// Look up an opcode by its assembly mnemonic.
    fn desc_by_name(&self, name: &str) -> Option<&'static InstrDesc> {
        self.descs().iter().find(|desc| desc.name == name)
    }

    /// Opcode of the pseudo opening a call sequence.
    fn call_frame_setup_opcode(&self) -> u16;

    /// Opcode of the pseudo closing a call sequence.
    fn call_frame_destroy_opcode(&self) -> u16;

    /// Byte amount carried by a call-frame pseudo.
    fn call_frame_amount(&self, inst: &MachineInstr) -> u32 {
        debug_assert!(inst.is_call_frame_pseudo());
        inst.imm_operand(0)
            .map_or(0, |amount| u32::try_from(amount.max(0)).unwrap_or(u32::MAX))
    }

    /// Whether the opcode may appear under the active feature set.
    fn is_legal(&self, _desc: &InstrDesc) -> bool {
        true
    }

    /// Whether frame-index elimination can rewrite a frame-index operand of this opcode.
    fn accepts_frame_index(&self, desc: &InstrDesc) -> bool {
        desc.is_memory_access()
    }
}

/// Register file of a target.
pub trait TargetRegisterInfo: Send + Sync {
    /// Assembly name of a register.
    fn reg_name(&self, reg: PhysReg) -> &'static str;

    /// Parse a register name, accepting aliases.
    fn reg_by_name(&self, name: &str) -> Option<PhysReg>;

    /// Registers a callee must preserve, in save order.
    fn callee_saved_regs(&self) -> &[PhysReg];

    /// Registers the allocator may never use in `mf`.
    fn reserved_regs(&self, mf: &MachineFunction) -> RegSet;

    /// Register frame objects are addressed from when not using SP.
    fn frame_register(&self, mf: &MachineFunction) -> PhysReg;

    /// Bytes needed to spill `reg`.
    fn spill_size(&self, reg: PhysReg) -> u32;

    /// Build a scavenger seeded with this target's scratch registers.
    fn create_scavenger(&self) -> RegScavenger;

    /// Rewrite the frame-index operand of the instruction at `at`.
    ///
    /// `sp_adj` is the number of bytes SP currently sits below its post-prologue
    /// value because of an open call sequence. Helper instructions may be inserted
    /// around the rewritten instruction; the returned position is the first
    /// instruction after everything that belongs to it.
    fn eliminate_frame_index(
        &self,
        mf: &mut MachineFunction,
        block: BlockId,
        at: usize,
        sp_adj: i32,
        scavenger: &mut RegScavenger,
    ) -> usize;
}

/// One CPU/feature configuration of a target, with its owned helper objects.
pub trait TargetSubtarget: Send + Sync {
    fn config(&self) -> &SubtargetConfig;

    fn cpu(&self) -> &str {
        self.config().cpu()
    }

    fn instr_info(&self) -> &dyn TargetInstrInfo;

    fn frame_lowering(&self) -> &dyn FrameLowering;

    fn register_info(&self) -> &dyn TargetRegisterInfo;
}
