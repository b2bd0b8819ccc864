// This module implements TargetRegisterInfo for RISCPI. Besides answering name, callee-saved
// and reserved-register queries from the tables in regs.rs, it rewrites frame-index operands
// once frame layout is known. Objects are addressed from fp when the function has
// variable-sized allocations (sp then moves by an unknown amount) and from sp otherwise,
// adding the adjustment of any open call sequence. An offset that does not fit the
// instruction's immediate field is built in a scavenged register: ip when the instruction
// does not use it, otherwise an argument register no instruction reads or writes (calls
// and returns read them implicitly), otherwise a register saved to the emergency slot
// around the access.

//! RISCPI register information and frame-index elimination.

use super::features::FEATURE_RESERVE_R9;
use super::instr_info::{desc, opcodes, RiscPiInstrInfo, IMM12_MAX};
use super::regs::{self, FP, IP, PC, R0, R1, R2, R3, R9, SP};
use crate::core::features::SubtargetConfig;
use crate::core::frame_info::FrameFacts;
use crate::core::machine::{BlockId, MIFlags, MachineFunction, MachineInstr, Operand};
use crate::core::regs::{PhysReg, RegSet};
use crate::core::scavenger::{RegScavenger, Scavenged};
use crate::core::target_info::{TargetInstrInfo, TargetRegisterInfo};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RiscPiRegisterInfo {
    config: Arc<SubtargetConfig>,
    callee_saved: &'static [PhysReg],
    instr_info: RiscPiInstrInfo,
}

impl RiscPiRegisterInfo {
    pub fn new(config: Arc<SubtargetConfig>) -> Self {
        Self {
            callee_saved: regs::callee_saved_regs(&config),
            instr_info: RiscPiInstrInfo::new(Arc::clone(&config)),
            config,
        }
    }

    fn facts(mf: &MachineFunction) -> FrameFacts {
        match mf.frame_facts() {
            Some(facts) => facts,
            None => {
                debug_assert!(false, "{}: frame indices rewritten before frame analysis", mf.name);
                FrameFacts {
                    has_fp: false,
                    reserved_call_frame: true,
                    realign_stack: false,
                }
            }
        }
    }

    /// Base register and offset addressing an object plus `extra` bytes.
    fn frame_reference(
        &self,
        mf: &MachineFunction,
        object_offset: i64,
        extra: i64,
        sp_adj: i32,
    ) -> (PhysReg, i64) {
        let facts = Self::facts(mf);
        if facts.has_fp && mf.frame_info.has_var_sized_objects && !facts.realign_stack {
            (FP, object_offset - mf.frame_info.stack_size as i64 + extra)
        } else {
            (SP, object_offset + sp_adj as i64 + extra)
        }
    }
}

fn set_address(inst: &mut MachineInstr, at: usize, base: PhysReg, offset: i64) {
    inst.operands[at] = Operand::Reg(base);
    match inst.operands.get_mut(at + 1) {
        Some(Operand::Imm(imm)) => *imm = offset,
        _ => inst.operands.insert(at + 1, Operand::Imm(offset)),
    }
}

impl TargetRegisterInfo for RiscPiRegisterInfo {
    fn reg_name(&self, reg: PhysReg) -> &'static str {
        regs::name(reg)
    }

    fn reg_by_name(&self, name: &str) -> Option<PhysReg> {
        regs::parse(name)
    }

    fn callee_saved_regs(&self) -> &[PhysReg] {
        self.callee_saved
    }

    fn reserved_regs(&self, mf: &MachineFunction) -> RegSet {
        let mut reserved = RegSet::from_regs(&[SP, PC, IP]);
        if mf.frame_facts().is_some_and(|facts| facts.has_fp) {
            reserved.insert(FP);
        }
        if self.config.has_feature(FEATURE_RESERVE_R9) {
            reserved.insert(R9);
        }
        reserved
    }

    fn frame_register(&self, mf: &MachineFunction) -> PhysReg {
        if mf.frame_facts().is_some_and(|facts| facts.has_fp) {
            FP
        } else {
            SP
        }
    }

    fn spill_size(&self, reg: PhysReg) -> u32 {
        regs::spill_size(reg)
    }

    fn create_scavenger(&self) -> RegScavenger {
        RegScavenger::new(&[IP], &[R3, R2, R1, R0])
    }

    fn eliminate_frame_index(
        &self,
        mf: &mut MachineFunction,
        block: BlockId,
        at: usize,
        sp_adj: i32,
        scavenger: &mut RegScavenger,
    ) -> usize {
        let inst = &mf.block(block).insts[at];
        let Some((pos, index)) = inst.operands.iter().enumerate().find_map(|(i, op)| match op {
            Operand::FrameIndex(index) => Some((i, *index)),
            _ => None,
        }) else {
            return at + 1;
        };
        debug_assert!(
            self.instr_info.accepts_frame_index(inst.desc()),
            "{}: frame index in unsupported instruction {}",
            mf.name,
            inst.desc().name
        );

        let extra = inst.imm_operand(pos + 1).unwrap_or(0);
        let object_offset = mf.frame_info.object_offset(index) as i64;
        let (base, offset) = self.frame_reference(mf, object_offset, extra, sp_adj);

        let (opcode, imm) = match inst.opcode() {
            opcodes::ADDI if offset < 0 => (opcodes::SUBI, -offset),
            opcode => (opcode, offset),
        };
        if self.instr_info.is_legal_offset(opcode, imm) {
            let inst = &mut mf.block_mut(block).insts[at];
            inst.set_desc(desc(opcode));
            set_address(inst, pos, base, imm);
            log::trace!(
                "{}: {index} -> [{}, #{imm}]",
                mf.name,
                regs::name(base)
            );
            return at + 1;
        }

        let scavenged = scavenger.scavenge_register(mf, &mf.block(block).insts[at]);
        let tmp = scavenged.reg();
        let mut seq = Vec::new();
        let mut reload = None;
        if let Scavenged::Spilled { slot, .. } = scavenged {
            let slot_offset = mf.frame_info.object_offset(slot) as i64 + sp_adj as i64;
            debug_assert!(slot_offset <= IMM12_MAX);
            seq.push(self.instr_info.store_reg(tmp, SP, slot_offset, MIFlags::NONE));
            reload = Some(self.instr_info.load_reg(tmp, SP, slot_offset, MIFlags::NONE));
        }
        seq.extend(
            self.instr_info
                .materialize_imm(tmp, offset as i32 as u32, MIFlags::NONE),
        );
        seq.push(MachineInstr::new(desc(opcodes::ADD)).reg(tmp).reg(base).reg(tmp));
        log::trace!(
            "{}: {index} -> {} + {offset} via {}",
            mf.name,
            regs::name(base),
            regs::name(tmp)
        );

        set_address(&mut mf.block_mut(block).insts[at], pos, tmp, 0);
        let inserted = mf.block_mut(block).insert_all(at, seq);
        let mut next = at + inserted + 1;
        if let Some(reload) = reload {
            mf.block_mut(block).insert(next, reload);
            next += 1;
        }
        next
    }
}
