// This module implements FrameLowering for RISCPI. The frame grows down from the incoming
// stack pointer: the callee-saved area sits at the top, directly below the caller's frame,
// followed by locals, scavenging slots and, when the call frame is reserved, the outgoing
// argument area at the bottom. The prologue first drops SP by the callee-saved area and
// stores the saved registers, then points fp at the incoming SP when the function keeps a
// frame pointer, then allocates the rest of the frame and finally realigns SP if an object
// needs more than the 8-byte ABI alignment. The epilogue undoes these steps in reverse,
// restoring SP from fp whenever SP moved by an amount unknown at compile time. Call-frame
// pseudos are plain deletions when the call frame is reserved and become explicit SP
// adjustments otherwise.

//! RISCPI frame lowering.

use super::instr_info::{RiscPiInstrInfo, IMM12_MAX};
use super::regs::{self, FP, LR, SP, STACK_ALIGN};
use crate::core::features::SubtargetConfig;
use crate::core::frame_info::{align_to, FrameFacts};
use crate::core::frame_lowering::{clobbered_callee_saves, FrameLowering};
use crate::core::machine::{BlockId, FramePhase, MIFlags, MachineFunction};
use crate::core::regs::{PhysReg, RegSet};
use crate::core::scavenger::RegScavenger;
use crate::core::target_info::TargetInstrInfo;
use crate::target::TargetOptions;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RiscPiFrameLowering {
    config: Arc<SubtargetConfig>,
    options: TargetOptions,
    instr_info: RiscPiInstrInfo,
    callee_saved: &'static [PhysReg],
}

impl RiscPiFrameLowering {
    pub fn new(config: Arc<SubtargetConfig>, instr_info: RiscPiInstrInfo, options: TargetOptions) -> Self {
        Self {
            callee_saved: regs::callee_saved_regs(&config),
            config,
            options,
            instr_info,
        }
    }

    pub fn config(&self) -> &SubtargetConfig {
        &self.config
    }

    /// Realignment needs a fixed SP to address locals from; without a base
    /// pointer that rules out variable-sized objects.
    fn can_realign_stack(&self, mf: &MachineFunction) -> bool {
        !mf.frame_info.has_var_sized_objects
    }

    fn facts(&self, mf: &MachineFunction) -> FrameFacts {
        match mf.frame_facts() {
            Some(facts) => facts,
            None => {
                debug_assert!(false, "{}: frame hook called before frame analysis", mf.name);
                FrameFacts {
                    has_fp: self.has_fp(mf),
                    reserved_call_frame: self.has_reserved_call_frame(mf),
                    realign_stack: self.needs_stack_realignment(mf),
                }
            }
        }
    }

    /// Upper bound on the final frame size, used to decide whether the
    /// scavenger needs an emergency slot.
    fn estimate_stack_size(&self, mf: &MachineFunction, saved: &RegSet) -> u32 {
        let callee_saved: u32 = saved.iter().map(regs::spill_size).sum();
        let call_frame = mf
            .instrs()
            .filter(|inst| inst.is_call_frame_pseudo())
            .map(|inst| self.instr_info.call_frame_amount(inst))
            .max()
            .unwrap_or(0);
        let mut estimate = align_to(mf.frame_info.estimate_local_size(), STACK_ALIGN)
            .saturating_add(align_to(callee_saved, STACK_ALIGN))
            .saturating_add(align_to(call_frame, STACK_ALIGN));
        if mf.frame_info.max_alignment > STACK_ALIGN {
            estimate = estimate.saturating_add(mf.frame_info.max_alignment - STACK_ALIGN);
        }
        estimate
    }
}

impl FrameLowering for RiscPiFrameLowering {
    fn stack_alignment(&self) -> u32 {
        STACK_ALIGN
    }

    fn callee_saved_regs(&self) -> &[PhysReg] {
        self.callee_saved
    }

    fn has_fp(&self, mf: &MachineFunction) -> bool {
        let info = &mf.frame_info;
        self.options.disable_fp_elim
            || mf.attrs.frame_pointer_all
            || info.has_var_sized_objects
            || info.frame_address_taken
            || self.needs_stack_realignment(mf)
    }

    fn has_reserved_call_frame(&self, mf: &MachineFunction) -> bool {
        !mf.frame_info.has_var_sized_objects
    }

    fn needs_stack_realignment(&self, mf: &MachineFunction) -> bool {
        if mf.frame_info.max_alignment <= STACK_ALIGN
            || !self.options.realign_stack
            || mf.attrs.no_realign_stack
        {
            return false;
        }
        if !self.can_realign_stack(mf) {
            log::warn!(
                "{}: cannot realign a frame with variable-sized objects to {} bytes",
                mf.name,
                mf.frame_info.max_alignment
            );
            return false;
        }
        true
    }

    fn eliminate_call_frame_pseudo_instr(
        &self,
        mf: &mut MachineFunction,
        block: BlockId,
        at: usize,
    ) -> usize {
        let facts = self.facts(mf);
        let inst = &mf.block(block).insts[at];
        debug_assert!(inst.is_call_frame_pseudo(), "{}: not a call-frame pseudo", mf.name);

        if !facts.reserved_call_frame {
            let amount = align_to(self.instr_info.call_frame_amount(inst), STACK_ALIGN) as i64;
            if amount != 0 {
                let delta = if inst.desc().is_frame_setup_pseudo {
                    -amount
                } else {
                    amount
                };
                let seq = self.instr_info.adjust_reg(SP, SP, delta, MIFlags::NONE);
                log::trace!("{}: call frame adjustment sp += {delta}", mf.name);
                let inserted = mf.block_mut(block).insert_all(at, seq);
                return mf.block_mut(block).erase(at + inserted);
            }
        }

        mf.block_mut(block).erase(at)
    }

    fn emit_prologue(&self, mf: &mut MachineFunction, block: BlockId) {
        let facts = self.facts(mf);
        debug_assert!(mf.phase() >= FramePhase::Analyzed);
        debug_assert!(mf.phase() < FramePhase::PrologueEmitted, "{}: prologue emitted twice", mf.name);

        let info = &mf.frame_info;
        let stack_size = info.stack_size as i64;
        let csr_area = info.callee_saved_area_size as i64;
        debug_assert!(stack_size >= csr_area);
        debug_assert!(
            !facts.has_fp || info.callee_saved_regs().any(|reg| reg == FP),
            "{}: fp used as frame pointer without being saved",
            mf.name
        );

        if stack_size == 0 && info.callee_saved_info.is_empty() {
            log::trace!("{}: empty frame, no prologue", mf.name);
            mf.advance_phase(FramePhase::PrologueEmitted);
            return;
        }

        let flags = MIFlags::FRAME_SETUP;
        let mut seq = self.instr_info.adjust_reg(SP, SP, -csr_area, flags);
        for csi in &info.callee_saved_info {
            seq.push(
                self.instr_info
                    .store_reg(csi.reg, SP, csi.spill_offset as i64, flags),
            );
        }
        if facts.has_fp {
            seq.extend(self.instr_info.adjust_reg(FP, SP, csr_area, flags));
        }
        seq.extend(self.instr_info.adjust_reg(SP, SP, -(stack_size - csr_area), flags));
        if facts.realign_stack {
            seq.push(self.instr_info.align_sp(info.max_alignment, flags));
        }

        log::trace!("{}: prologue of {} instructions", mf.name, seq.len());
        mf.block_mut(block).insert_all(0, seq);
        mf.advance_phase(FramePhase::PrologueEmitted);
    }

    fn emit_epilogue(&self, mf: &mut MachineFunction, block: BlockId) {
        let facts = self.facts(mf);
        debug_assert!(
            mf.phase() >= FramePhase::PrologueEmitted,
            "{}: epilogue emitted before the prologue",
            mf.name
        );

        let info = &mf.frame_info;
        let stack_size = info.stack_size as i64;
        let csr_area = info.callee_saved_area_size as i64;
        if stack_size == 0 && info.callee_saved_info.is_empty() {
            mf.advance_phase(FramePhase::EpilogueEmitted);
            return;
        }

        let flags = MIFlags::FRAME_DESTROY;
        let mut seq = if facts.has_fp && (info.has_var_sized_objects || facts.realign_stack) {
            self.instr_info.adjust_reg(SP, FP, -csr_area, flags)
        } else {
            self.instr_info.adjust_reg(SP, SP, stack_size - csr_area, flags)
        };
        for csi in info.callee_saved_info.iter().rev() {
            seq.push(
                self.instr_info
                    .load_reg(csi.reg, SP, csi.spill_offset as i64, flags),
            );
        }
        seq.extend(self.instr_info.adjust_reg(SP, SP, csr_area, flags));

        let at = mf.block(block).return_position();
        log::trace!("{}: epilogue of {} instructions in {}", mf.name, seq.len(), mf.block(block).name);
        mf.block_mut(block).insert_all(at, seq);
        mf.advance_phase(FramePhase::EpilogueEmitted);
    }

    fn determine_callee_saves(
        &self,
        mf: &mut MachineFunction,
        saved: &mut RegSet,
        scavenger: Option<&mut RegScavenger>,
    ) {
        let facts = self.facts(mf);
        saved.union_with(&clobbered_callee_saves(self.callee_saved, mf));
        if facts.has_fp {
            saved.insert(FP);
        }
        if mf.has_calls() {
            saved.insert(LR);
        }

        if let Some(scavenger) = scavenger {
            let estimate = self.estimate_stack_size(mf, saved);
            if estimate as i64 > IMM12_MAX {
                let slot = mf.frame_info.create_scavenging_slot(4, 4);
                scavenger.add_scavenging_frame_index(slot);
                log::debug!(
                    "{}: estimated frame of {estimate} bytes, reserving scavenging slot {slot}",
                    mf.name
                );
            }
        }

        log::debug!(
            "{}: callee-saved [{}]",
            mf.name,
            saved.iter().map(regs::name).collect::<Vec<_>>().join(", ")
        );
        mf.advance_phase(FramePhase::CalleeSavesDetermined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::MachineInstr;
    use crate::riscpi::features::FEATURES;
    use crate::riscpi::instr_info::{desc, opcodes::*};

    fn frame_lowering(fs: &str, options: TargetOptions) -> RiscPiFrameLowering {
        let config = Arc::new(SubtargetConfig::parse(&FEATURES, "", fs));
        RiscPiFrameLowering::new(Arc::clone(&config), RiscPiInstrInfo::new(config), options)
    }

    fn leaf() -> MachineFunction {
        let mut mf = MachineFunction::new("leaf");
        let entry = mf.add_block("entry");
        mf.block_mut(entry).push(MachineInstr::new(desc(RET)));
        mf
    }

    #[test]
    fn test_has_fp_conditions() {
        let tfi = frame_lowering("", TargetOptions::default());
        let mut mf = leaf();
        assert!(!tfi.has_fp(&mf));

        mf.frame_info.frame_address_taken = true;
        assert!(tfi.has_fp(&mf));

        let mut mf = leaf();
        mf.attrs.frame_pointer_all = true;
        assert!(tfi.has_fp(&mf));

        let mut mf = leaf();
        mf.frame_info.has_var_sized_objects = true;
        assert!(tfi.has_fp(&mf));
        assert!(!tfi.has_reserved_call_frame(&mf));

        let forced = frame_lowering(
            "",
            TargetOptions {
                disable_fp_elim: true,
                ..TargetOptions::default()
            },
        );
        assert!(forced.has_fp(&leaf()));
    }

    #[test]
    fn test_over_aligned_objects_need_realignment() {
        let tfi = frame_lowering("", TargetOptions::default());
        let mut mf = leaf();
        mf.frame_info.create_stack_object(16, 16);
        assert!(tfi.needs_stack_realignment(&mf));
        assert!(tfi.has_fp(&mf));

        mf.attrs.no_realign_stack = true;
        assert!(!tfi.needs_stack_realignment(&mf));
        assert!(!tfi.has_fp(&mf));
    }

    #[test]
    fn test_callee_saves_add_lr_and_fp() {
        let tfi = frame_lowering("", TargetOptions::default());
        let mut mf = leaf();
        mf.attrs.frame_pointer_all = true;
        let entry = mf.entry_block();
        mf.block_mut(entry)
            .insert(0, MachineInstr::new(desc(BL)).symbol("callee"));
        tfi.analyze_frame(&mut mf);

        let mut saved = RegSet::new();
        tfi.determine_callee_saves(&mut mf, &mut saved, None);
        assert_eq!(saved.iter().collect::<Vec<_>>(), vec![FP, LR]);
    }

    #[test]
    fn test_large_frame_reserves_scavenging_slot() {
        let tfi = frame_lowering("", TargetOptions::default());
        let mut mf = leaf();
        mf.frame_info.create_stack_object(8192, 8);
        tfi.analyze_frame(&mut mf);

        let mut rs = RegScavenger::new(&[regs::IP], &[]);
        let mut saved = RegSet::new();
        tfi.determine_callee_saves(&mut mf, &mut saved, Some(&mut rs));
        assert_eq!(rs.scavenging_frame_indices().len(), 1);
        assert_eq!(mf.frame_info.num_objects(), 2);
    }

    #[test]
    fn test_reserved_call_frame_pseudo_is_deleted() {
        let tfi = frame_lowering("", TargetOptions::default());
        let mut mf = leaf();
        let entry = mf.entry_block();
        let call = tfi.instr_info.call_sequence("f", 8);
        mf.block_mut(entry).insert_all(0, call);
        tfi.analyze_frame(&mut mf);

        let next = tfi.eliminate_call_frame_pseudo_instr(&mut mf, entry, 0);
        assert_eq!(next, 0);
        assert_eq!(mf.block(entry).insts[0].opcode(), BL);
        assert_eq!(mf.block(entry).len(), 3);
    }
}
