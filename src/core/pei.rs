// This module implements the prologue/epilogue inserter, the target-independent pass that
// drives a subtarget's FrameLowering over a machine function. It runs frame analysis,
// lets the target choose callee-saved registers (with a register scavenger available for
// large frames), assigns callee-saved spill slots, lays out the stack objects, emits the
// prologue in the entry block and an epilogue in every returning block, and finally walks
// every block eliminating call-frame pseudos and rewriting frame-index operands. While
// walking it tracks how far SP has moved inside open call sequences so that SP-relative
// offsets stay correct when the call frame is not reserved. Per-function scratch data lives
// in the session's bump arena and every step is recorded in the session statistics.
//
// Frame layout, SP-relative after the prologue, from low to high addresses:
//
//   [outgoing call frame][scavenging slots][locals][callee-saved area]
//                                                                     ^ incoming SP
//
// The outgoing area is only part of the fixed frame when the call frame is reserved.

//! Prologue/epilogue insertion and frame-index elimination.

use super::frame_info::{align_to, CalleeSavedInfo, FrameFacts, FrameIndex, StackObjectKind};
use super::frame_lowering::FrameLowering;
use super::machine::{FramePhase, MachineFunction, Operand};
use super::regs::RegSet;
use super::scavenger::RegScavenger;
use super::session::CompilationSession;
use super::target_info::{TargetInstrInfo, TargetRegisterInfo, TargetSubtarget};
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

/// Runs frame lowering for one subtarget.
pub struct PrologEpilogInserter<'st> {
    subtarget: &'st dyn TargetSubtarget,
}

impl<'st> PrologEpilogInserter<'st> {
    pub fn new(subtarget: &'st dyn TargetSubtarget) -> Self {
        Self { subtarget }
    }

    /// Lower every function of a module.
    pub fn run_module(&self, functions: &mut [MachineFunction], session: &CompilationSession<'_>) {
        for mf in functions {
            self.run(mf, session);
        }
    }

    /// Lower the frame of `mf`.
    pub fn run(&self, mf: &mut MachineFunction, session: &CompilationSession<'_>) {
        let tfi = self.subtarget.frame_lowering();
        let tri = self.subtarget.register_info();
        let tii = self.subtarget.instr_info();

        if mf.num_blocks() == 0 {
            log::warn!("{}: function has no blocks, skipping frame lowering", mf.name);
            return;
        }
        session.set_current_function(&mf.name);
        log::debug!("lowering frame of {} ({} instructions)", mf.name, mf.instr_count());

        let facts = tfi.analyze_frame(mf);

        let mut scavenger = tri.create_scavenger();
        let mut saved = RegSet::new();
        tfi.determine_callee_saves(mf, &mut saved, Some(&mut scavenger));
        assign_callee_saved_slots(session.arena(), tfi, tri, mf, &saved);
        session.record_callee_saved(saved.len());

        mf.frame_info.max_call_frame_size = max_call_frame_size(tii, mf);
        layout_frame(tfi, mf, facts);
        log::debug!(
            "{}: stack_size={} callee_saved_area={} max_call_frame={}",
            mf.name,
            mf.frame_info.stack_size,
            mf.frame_info.callee_saved_area_size,
            mf.frame_info.max_call_frame_size
        );

        let entry = mf.entry_block();
        let before = mf.block(entry).len();
        tfi.emit_prologue(mf, entry);
        session.record_prologue(mf.block(entry).len() - before);

        for block in mf.return_blocks() {
            let before = mf.block(block).len();
            tfi.emit_epilogue(mf, block);
            session.record_epilogue(mf.block(block).len() - before);
        }

        self.replace_frame_indices(mf, facts, &mut scavenger, session);
        mf.advance_phase(FramePhase::CallFramePseudosEliminated);

        session.record_function_lowered(&mf.name, mf.frame_info.stack_size, facts.has_fp);
        session.finish_function();
    }

    fn replace_frame_indices(
        &self,
        mf: &mut MachineFunction,
        facts: FrameFacts,
        scavenger: &mut RegScavenger,
        session: &CompilationSession<'_>,
    ) {
        let tfi = self.subtarget.frame_lowering();
        let tri = self.subtarget.register_info();
        let tii = self.subtarget.instr_info();
        let align = tfi.stack_alignment();

        let blocks = BumpVec::from_iter_in(mf.block_ids(), session.arena());
        for &block in blocks.iter() {
            let mut sp_adj: i32 = 0;
            let mut at = 0;
            while at < mf.block(block).len() {
                let inst = &mf.block(block).insts[at];

                let opcode = inst.opcode();
                if opcode == tii.call_frame_setup_opcode()
                    || opcode == tii.call_frame_destroy_opcode()
                {
                    if !facts.reserved_call_frame {
                        let amount = align_to(tii.call_frame_amount(inst), align);
                        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
                        if opcode == tii.call_frame_setup_opcode() {
                            sp_adj = sp_adj.saturating_add(amount);
                        } else {
                            sp_adj = sp_adj.saturating_sub(amount);
                        }
                    }
                    at = tfi.eliminate_call_frame_pseudo_instr(mf, block, at);
                    session.record_call_frame_pseudo();
                    continue;
                }

                if inst
                    .operands
                    .iter()
                    .any(|op| matches!(op, Operand::FrameIndex(_)))
                {
                    let spills = scavenger.spill_count();
                    at = tri.eliminate_frame_index(mf, block, at, sp_adj, scavenger);
                    session.record_frame_index();
                    if scavenger.spill_count() > spills {
                        session.record_scavenger_spill();
                    }
                    continue;
                }

                at += 1;
            }

            if sp_adj != 0 {
                log::warn!(
                    "{}: call sequence left open at the end of {} (sp_adj={sp_adj})",
                    mf.name,
                    mf.block(block).name
                );
            }
        }
    }
}

/// Give every register in `saved` a slot in the callee-saved area.
///
/// Wider registers are placed first so every slot stays naturally aligned.
fn assign_callee_saved_slots(
    arena: &Bump,
    tfi: &dyn FrameLowering,
    tri: &dyn TargetRegisterInfo,
    mf: &mut MachineFunction,
    saved: &RegSet,
) {
    let mut order = BumpVec::with_capacity_in(saved.len(), arena);
    order.extend(saved.iter().map(|reg| (tri.spill_size(reg), reg)));
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let info = &mut mf.frame_info;
    info.callee_saved_info.clear();
    let mut offset = 0;
    for &(size, reg) in order.iter() {
        offset = align_to(offset, size);
        info.callee_saved_info.push(CalleeSavedInfo {
            reg,
            spill_offset: offset,
            size,
        });
        offset += size;
    }
    info.callee_saved_area_size = align_to(offset, tfi.stack_alignment());
}

/// Largest amount carried by any call-frame pseudo. Also marks the function as
/// making calls when it contains a call sequence.
fn max_call_frame_size(tii: &dyn TargetInstrInfo, mf: &mut MachineFunction) -> u32 {
    let mut max = 0;
    let mut saw_call = false;
    for inst in mf.instrs() {
        if inst.is_call_frame_pseudo() {
            max = max.max(tii.call_frame_amount(inst));
            saw_call = true;
        } else if inst.desc().is_call {
            saw_call = true;
        }
    }
    mf.frame_info.has_calls |= saw_call;
    max
}

/// Assign SP-relative offsets to every stack object and compute the stack size.
pub fn layout_frame(tfi: &dyn FrameLowering, mf: &mut MachineFunction, facts: FrameFacts) {
    let align = tfi.stack_alignment();
    let info = &mut mf.frame_info;

    let mut offset = if facts.reserved_call_frame {
        align_to(info.max_call_frame_size, align)
    } else {
        0
    };

    for kind in [StackObjectKind::ScavengingSlot, StackObjectKind::Local] {
        for index in 0..info.num_objects() {
            let index = FrameIndex(index as u32);
            let (size, obj_align) = {
                let obj = info.object(index);
                if obj.kind != kind {
                    continue;
                }
                (obj.size, obj.align)
            };
            offset = align_to(offset, obj_align);
            info.set_object_offset(index, i32::try_from(offset).unwrap_or(i32::MAX));
            offset = offset.saturating_add(size);
        }
    }

    info.stack_size = align_to(offset.saturating_add(info.callee_saved_area_size), align);
    if info.stack_size > i32::MAX as u32 {
        log::error!("{}: frame of {} bytes exceeds the addressable range", mf.name, info.stack_size);
    }
    debug_assert_eq!(info.stack_size % align, 0);
}
